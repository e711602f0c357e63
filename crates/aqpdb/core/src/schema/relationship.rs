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

use aqpdb_common::{AttributeRef, qualify};
use serde::{Deserialize, Serialize};

/// A directed foreign-key edge: `source.source_attribute` references `target.target_attribute`.
///
/// The multiplier lives on the target table and counts, per target row, how many source rows point at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: String,
    pub source_attribute: String,
    pub target: String,
    pub target_attribute: String,
    pub multiplier_name: String,
    /// Multiplier with zero fan-out replaced by one.
    pub multiplier_name_nn: String,
    pub identifier: String,
}

impl Relationship {
    pub(crate) fn new(source: &str, source_attribute: &str, target: &str, target_attribute: &str, multiplier_name: Option<&str>) -> Self {
        let multiplier_name = multiplier_name.map(str::to_string).unwrap_or_else(|| format!("mul_{source}.{source_attribute}"));
        Self {
            identifier: Self::identifier_for(source, source_attribute, target, target_attribute),
            source: source.to_string(),
            source_attribute: source_attribute.to_string(),
            target: target.to_string(),
            target_attribute: target_attribute.to_string(),
            multiplier_name_nn: format!("{multiplier_name}_nn"),
            multiplier_name,
        }
    }

    pub fn identifier_for(source: &str, source_attribute: &str, target: &str, target_attribute: &str) -> String {
        format!("{source}.{source_attribute} = {target}.{target_attribute}")
    }

    pub fn touches(&self, table: &str) -> bool {
        self.source == table || self.target == table
    }

    pub fn multiplier(&self) -> AttributeRef {
        AttributeRef::new(&self.target, &self.multiplier_name)
    }

    pub fn multiplier_nn(&self) -> AttributeRef {
        AttributeRef::new(&self.target, &self.multiplier_name_nn)
    }

    pub fn multiplier_column(&self) -> String {
        qualify(&self.target, &self.multiplier_name)
    }

    pub fn multiplier_nn_column(&self) -> String {
        qualify(&self.target, &self.multiplier_name_nn)
    }

    pub fn source_column(&self) -> String {
        qualify(&self.source, &self.source_attribute)
    }

    pub fn target_column(&self) -> String {
        qualify(&self.target, &self.target_attribute)
    }
}
