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

//! # Schema Graph
//!
//! Tables, foreign-key relationships and functional-dependency rules of a relational schema.
//! Pure data plus lookups; no I/O.
//!
//! Relationships are directed from the referencing (source) table to the referenced (target)
//! table. Each one names a multiplier attribute that the preparation pipeline materializes on the
//! target table, and each is registered on both endpoint tables when added.
//!
//! ```rust
//! use aqpdb_core::schema::{SchemaGraph, Table};
//!
//! let mut graph = SchemaGraph::new();
//! graph.add_table(Table::new("customers").with_attributes(&["id", "region"])).unwrap();
//! graph.add_table(Table::new("orders").with_attributes(&["id", "customer_id"])).unwrap();
//! let id = graph.add_relationship("orders", "customer_id", "customers", "id", None).unwrap();
//!
//! assert_eq!(id, "orders.customer_id = customers.id");
//! assert_eq!(graph.relationship(&id).unwrap().multiplier_column(), "customers.mul_orders.customer_id");
//! ```

pub mod graph;
pub mod path;
pub mod relationship;
pub mod table;

use thiserror::Error;

pub use graph::SchemaGraph;
pub use path::{JoinDirection, JoinPath, JoinStep, assemble_join_path};
pub use relationship::Relationship;
pub use table::Table;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Unknown attribute {attribute} on table {table}")]
    UnknownAttribute { table: String, attribute: String },
    #[error("Unknown relationship: {0}")]
    UnknownRelationship(String),
    #[error("Table already defined: {0}")]
    DuplicateTable(String),
    #[error("Relationship already defined: {0}")]
    DuplicateRelationship(String),
    #[error("Invalid table {table}: {reason}")]
    InvalidTable { table: String, reason: String },
    #[error("No join path: none of {remaining:?} touches the joined tables {joined:?}")]
    NoJoinPath { joined: Vec<String>, remaining: Vec<String> },
}

pub type SchemaResult<T> = Result<T, SchemaError>;
