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

use std::collections::BTreeSet;

use super::{AlgebraResult, IndicatorExpectation, Probability};

/// A learned density model over the join of a fixed set of tables.
///
/// Terms are evaluated as raw expectations: the caller applies floors and reciprocals.
#[cfg_attr(test, mockall::automock)]
pub trait DensityModel: Send + Sync {
    fn name(&self) -> String;

    /// Estimated size of the join the model was trained on.
    fn full_join_size(&self) -> f64;

    fn tables(&self) -> BTreeSet<String>;

    fn relationships(&self) -> BTreeSet<String>;

    fn indicator_expectation(&self, term: &IndicatorExpectation) -> AlgebraResult<f64>;

    // Fully qualified, the generated mock has its own `Expectation`.
    fn expectation(&self, term: &crate::algebra::terms::Expectation) -> AlgebraResult<f64>;

    fn probability(&self, term: &Probability) -> AlgebraResult<f64>;
}
