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

//! # Join Sampling Engine
//!
//! Produces bounded samples of single tables and of joins along schema relationships.
//!
//! A join sample starts from one table, draws a uniform subset of its stored rows at a rate derived
//! from the requested size, then walks the relationships: referencing tables are fanned out (every
//! matching row, or one row of null sentinels if none match), referenced tables are looked up.
//! The result is subsampled to the requested size.
//!
//! Besides the prepared columns, joined samples carry the defined multipliers (`<multiplier>_nn`,
//! where a zero multiplier becomes 1) and a null-indicator column per table that is 1 on rows where
//! the table had no partner.

pub mod cache;
pub mod join;
pub mod plan;
pub mod rounding;

use thiserror::Error;

use crate::schema::SchemaError;
use crate::storage::StorageError;

pub use cache::TableCache;
pub use join::{JoinSample, JoinSampler, JoinSizeEstimate, SampleRequest, SampleTarget};
pub use plan::{SampleJob, relationship_requests, run_requests, single_table_requests};
pub use rounding::{effective_rate, probability_round};

#[derive(Debug, Error)]
pub enum SamplingError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("No metadata for table {0}")]
    MissingMetadata(String),
    #[error("Key column {column} missing from prepared table {table}")]
    MissingKeyColumn { table: String, column: String },
    #[error("Sample request names no tables")]
    EmptyRequest,
    #[error("Incremental rate must lie strictly between 0 and 1, got {0}")]
    InvalidIncrementalRate(f64),
}

pub type SamplingResult<T> = Result<T, SamplingError>;
