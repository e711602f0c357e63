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

use aqpdb_common::AttributeRef;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::query::Condition;

fn same_set<T: Eq + Hash>(left: &[T], right: &[T]) -> bool {
    left.iter().collect::<HashSet<_>>() == right.iter().collect::<HashSet<_>>()
}

/// Order- and duplicate-insensitive hash of a list treated as a set.
fn set_hash<T: Hash>(items: &[T]) -> u64 {
    let mut hashes: Vec<u64> = items
        .iter()
        .map(|item| {
            let mut hasher = DefaultHasher::new();
            item.hash(&mut hasher);
            hasher.finish()
        })
        .collect();
    hashes.sort_unstable();
    hashes.dedup();
    let mut hasher = DefaultHasher::new();
    hashes.hash(&mut hasher);
    hasher.finish()
}

fn render_product(attributes: &[AttributeRef]) -> String {
    attributes.iter().map(AttributeRef::qualified).collect::<Vec<_>>().join("*")
}

fn render_conditions(conditions: &[Condition]) -> String {
    conditions.iter().map(ToString::to_string).collect::<Vec<_>>().join(" AND ")
}

/// Selectivity `P(conditions)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Probability {
    pub conditions: Vec<Condition>,
}

impl Probability {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }

    pub fn matches(&self, other: &Probability) -> bool {
        same_set(&self.conditions, &other.conditions)
    }
}

impl fmt::Display for Probability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P({})", render_conditions(&self.conditions))
    }
}

/// Conditional expectation `E(∏features / ∏normalizing_multipliers | conditions)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expectation {
    pub features: Vec<AttributeRef>,
    pub normalizing_multipliers: Vec<AttributeRef>,
    pub conditions: Vec<Condition>,
    /// Tables of the density model the term is evaluated against.
    pub tables: BTreeSet<String>,
}

impl Expectation {
    pub fn new(features: Vec<AttributeRef>, normalizing_multipliers: Vec<AttributeRef>, conditions: Vec<Condition>) -> Self {
        Self {
            features,
            normalizing_multipliers,
            conditions,
            tables: BTreeSet::new(),
        }
    }

    pub fn with_tables(mut self, tables: BTreeSet<String>) -> Self {
        self.tables = tables;
        self
    }

    pub fn matches(&self, other: &Expectation, ignore_model: bool) -> bool {
        same_set(&self.features, &other.features)
            && same_set(&self.normalizing_multipliers, &other.normalizing_multipliers)
            && same_set(&self.conditions, &other.conditions)
            && (ignore_model || self.tables == other.tables)
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E({}", render_product(&self.features))?;
        if !self.normalizing_multipliers.is_empty() {
            write!(f, " / ({})", render_product(&self.normalizing_multipliers))?;
        }
        write!(f, " | {})", render_conditions(&self.conditions))
    }
}

/// `E(∏numerator / ∏denominator * 1_{conditions})`, or its reciprocal when `inverse` is set.
///
/// Evaluated values below `floor` are raised to it, which keeps a model's underestimate of a
/// small but nonzero expectation from blowing up a reciprocal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorExpectation {
    pub numerator_multipliers: Vec<AttributeRef>,
    pub denominator_multipliers: Vec<AttributeRef>,
    pub conditions: Vec<Condition>,
    pub inverse: bool,
    /// Tables of the density model the term is evaluated against.
    pub tables: BTreeSet<String>,
    pub floor: f64,
}

impl IndicatorExpectation {
    pub fn new(denominator_multipliers: Vec<AttributeRef>, conditions: Vec<Condition>) -> Self {
        Self {
            numerator_multipliers: Vec::new(),
            denominator_multipliers,
            conditions,
            inverse: false,
            tables: BTreeSet::new(),
            floor: 0.0,
        }
    }

    pub fn with_numerator(mut self, numerator_multipliers: Vec<AttributeRef>) -> Self {
        self.numerator_multipliers = numerator_multipliers;
        self
    }

    pub fn with_tables(mut self, tables: BTreeSet<String>) -> Self {
        self.tables = tables;
        self
    }

    /// Sets the floor to `1 / full_join_size`.
    pub fn with_full_join_size(mut self, full_join_size: f64) -> Self {
        self.floor = if full_join_size > 0.0 { 1.0 / full_join_size } else { 0.0 };
        self
    }

    pub fn inverted(mut self) -> Self {
        self.inverse = !self.inverse;
        self
    }

    pub fn matches(&self, other: &IndicatorExpectation, ignore_inverse: bool, ignore_model: bool) -> bool {
        (ignore_inverse || self.inverse == other.inverse)
            && same_set(&self.numerator_multipliers, &other.numerator_multipliers)
            && same_set(&self.denominator_multipliers, &other.denominator_multipliers)
            && same_set(&self.conditions, &other.conditions)
            && (ignore_model || self.tables == other.tables)
    }

    /// Whether `other` is this term's reciprocal.
    pub fn is_inverse(&self, other: &IndicatorExpectation) -> bool {
        self.inverse != other.inverse && self.matches(other, true, false)
    }

    /// Hash consistent with [`matches`](Self::matches): list order and duplicates do not change it.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.inverse.hash(&mut hasher);
        set_hash(&self.numerator_multipliers).hash(&mut hasher);
        set_hash(&self.denominator_multipliers).hash(&mut hasher);
        set_hash(&self.conditions).hash(&mut hasher);
        self.tables.hash(&mut hasher);
        hasher.finish()
    }

    /// Whether some condition filters on one of the group-by attributes, in which case the term
    /// has to be evaluated once per group.
    pub fn contains_group_by(&self, group_by: &[AttributeRef]) -> bool {
        group_by.iter().any(|attribute| self.conditions.iter().any(|c| c.is_on(attribute)))
    }

    /// Applies the floor and, for inverse terms, the reciprocal to a model's raw expectation.
    pub fn finish(&self, expectation: f64) -> Option<f64> {
        let value = expectation.max(self.floor);
        match self.inverse {
            false => Some(value),
            true if value > 0.0 => Some(1.0 / value),
            true => None,
        }
    }
}

impl PartialEq for IndicatorExpectation {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other, false, false)
    }
}

impl Eq for IndicatorExpectation {}

impl Hash for IndicatorExpectation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

impl fmt::Display for IndicatorExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.inverse { " / E(" } else { " * E(" })?;
        if self.numerator_multipliers.is_empty() {
            f.write_str("1")?;
        } else {
            f.write_str(&render_product(&self.numerator_multipliers))?;
        }
        if !self.denominator_multipliers.is_empty() {
            write!(f, "/{}", render_product(&self.denominator_multipliers))?;
        }
        if !self.conditions.is_empty() {
            write!(f, " * 1_{{{}}}", render_conditions(&self.conditions))?;
        }
        f.write_str(")")
    }
}

/// One multiplicative part of a compiled formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Factor {
    Indicator(IndicatorExpectation),
    Expectation(Expectation),
    Probability(Probability),
}

impl Factor {
    pub fn contains_group_by(&self, group_by: &[AttributeRef]) -> bool {
        let conditions = match self {
            Factor::Indicator(term) => return term.contains_group_by(group_by),
            Factor::Expectation(term) => &term.conditions,
            Factor::Probability(term) => &term.conditions,
        };
        group_by.iter().any(|attribute| conditions.iter().any(|c| c.is_on(attribute)))
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factor::Indicator(term) => write!(f, "{term}"),
            Factor::Expectation(term) => write!(f, " * {term}"),
            Factor::Probability(term) => write!(f, " * {term}"),
        }
    }
}
