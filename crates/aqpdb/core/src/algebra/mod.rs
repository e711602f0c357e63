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

//! # Probabilistic Query Algebra
//!
//! Queries are compiled into formulas over three kinds of terms that a density model evaluates:
//! [`Probability`], [`Expectation`] and [`IndicatorExpectation`]. Terms compare as sets of
//! multipliers and conditions, so one evaluated value can serve every structurally equal
//! occurrence, and a reciprocal term can reuse the value of the term it inverts. [`TermMemo`]
//! holds those values for a whole [`Ensemble`].
//!
//! ```
//! use aqpdb_common::AttributeRef;
//! use aqpdb_core::algebra::IndicatorExpectation;
//! use aqpdb_core::query::Condition;
//!
//! let condition = Condition::parse("orders", "customer_id=5").unwrap();
//! let multiplier = AttributeRef::new("customers", "mul_orders.customer_id");
//! let term = IndicatorExpectation::new(vec![multiplier], vec![condition]);
//! assert!(term.is_inverse(&term.clone().inverted()));
//! ```

pub mod compile;
pub mod ensemble;
pub mod memo;
pub mod model;
pub mod terms;

use thiserror::Error;

use crate::query::QueryError;
use crate::schema::SchemaError;

pub use compile::{CompiledAggregate, Formula, compile_aggregate, compile_cardinality};
pub use ensemble::Ensemble;
pub use memo::TermMemo;
#[cfg(test)]
pub use model::MockDensityModel;
pub use model::DensityModel;
pub use terms::{Expectation, Factor, IndicatorExpectation, Probability};

#[derive(Debug, Error)]
pub enum AlgebraError {
    #[error("No model covers tables {0:?}")]
    NoCoveringModel(Vec<String>),
    #[error("Density model error: {0}")]
    Model(String),
    #[error("Unsupported aggregation: {0}")]
    UnsupportedAggregation(String),
    #[error("Expectation in a denominator evaluated to zero:{0}")]
    ZeroExpectation(String),
    #[error("Group has {found} values, query groups by {expected} attributes")]
    GroupArity { expected: usize, found: usize },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Query(#[from] QueryError),
}

pub type AlgebraResult<T> = Result<T, AlgebraError>;
