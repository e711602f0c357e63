// AqpDB
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # AqpDB core
//!
//! Data side of a learned approximate query processing engine:
//!
//! - [`schema`]: tables, relationships and functional dependencies of a relational schema.
//! - [`prep`]: turns raw tables into all-numeric encoded tables plus metadata, materializing
//!   relationship multipliers and compressing functionally dependent columns.
//! - [`storage`]: persistence of prepared tables and their metadata.
//! - [`sampling`]: bounded, representative samples of single tables and joins.
//! - [`query`]: cardinality and aggregate queries with typed conditions, and their SQL rendering.
//! - [`algebra`]: compilation of queries into terms evaluated by density models, with
//!   deduplication of terms across an ensemble.

pub mod algebra;
pub mod prep;
pub mod query;
pub mod sampling;
pub mod schema;
pub mod storage;
