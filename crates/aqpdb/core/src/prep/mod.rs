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

//! # Table Preparation Pipeline
//!
//! Turns one raw table into an all-numeric encoded table plus [`TableMetadata`]:
//!
//! 1. **Column scoping**: columns become `table.attribute`, ignored attributes are dropped.
//! 2. **Functional-dependency compression**: every dependent column is replaced by a
//!    determinant value -> dependent value map stored in the metadata. A determinant that maps
//!    to two different dependent values is a data-quality defect and aborts preparation.
//! 3. **Multipliers**: for each relationship referencing the table, the number of referencing
//!    rows per primary key divided by the referencing table's sample rate, stored as
//!    `target.<multiplier name>`, with its mean recorded in `incoming_means`.
//! 4. **Categorical and null encoding**: string columns become codes (0 is null), numeric
//!    nulls become `mean + epsilon`, which must not collide with an existing value.
//! 5. **Capacity cap**: above `max_data` rows a seeded uniform subset is stored and the
//!    truncation is visible through `length` vs `stored_length`.

pub mod metadata;
pub mod pipeline;
pub mod raw;

use thiserror::Error;

pub use metadata::{CategoricalDictionary, DependencyMap, EncodedTable, PreparedTable, TableMetadata};
pub use pipeline::{prepare_all_tables, prepare_table};
pub use raw::{InMemorySource, RawTable, RawTableSource};

use crate::schema::SchemaError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum PreparationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("Raw data for table {0} not available")]
    MissingTable(String),
    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },
    #[error("Row has {found} values, expected {expected}")]
    RowWidth { expected: usize, found: usize },
    #[error("Functional dependency {determinant} -> {dependent} violated in {table}: {value} maps to both {existing} and {conflicting}")]
    FunctionalDependencyViolation {
        table: String,
        determinant: String,
        dependent: String,
        value: String,
        existing: String,
        conflicting: String,
    },
    #[error("Null sentinel {sentinel} of {attribute} in {table} collides with an existing value")]
    NullSentinelCollision { table: String, attribute: String, sentinel: f64 },
    #[error("Column {attribute} of {table} holds values without a finite encoding")]
    NonFiniteValue { table: String, attribute: String },
    #[error("Unsupported relationship {relationship}: {reason}")]
    UnsupportedRelationship { relationship: String, reason: String },
}

pub type PreparationResult<T> = Result<T, PreparationError>;
