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

//! # Queries
//!
//! Cardinality and aggregate queries over joins of schema tables, with typed filter conditions.
//! Queries are compiled into probabilistic formulas by [`crate::algebra`] and can be rendered
//! as SQL through [`sql`] to obtain true answers from a physical database.

pub mod builder;
pub mod condition;
pub mod sql;

use thiserror::Error;

use crate::schema::SchemaError;

pub use builder::{Aggregation, AggregationOperation, AggregationType, Query, QueryType};
pub use condition::{Condition, Literal, Operator};
pub use sql::{GroundTruth, GroundTruthError, GroundTruthResult, count_all, count_with_timeout, render_join_query};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("Invalid condition '{condition}': {reason}")]
    InvalidCondition { condition: String, reason: String },
    #[error("Tables not connected by any relationship of the query: {0:?}")]
    UnjoinedTables(Vec<String>),
}

pub type QueryResult<T> = Result<T, QueryError>;
