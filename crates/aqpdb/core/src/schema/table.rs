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

use aqpdb_common::qualify;
use serde::{Deserialize, Serialize};

/// A base table of the schema.
///
/// Dependency rules are stored fully qualified (`table.source`, `table.dest`), where
/// `source` functionally determines `dest`. Relationship back-references are filled in by
/// [`SchemaGraph::add_relationship`](super::SchemaGraph::add_relationship); a table never
/// creates them itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub attributes: Vec<String>,
    pub primary_keys: Vec<String>,
    pub size: u64,
    pub sample_rate: f64,
    pub dependency_rules: Vec<(String, String)>,
    /// Synthetic attribute that flags rows where this table is missing from an outer join.
    pub null_indicator: String,
    /// Dropped before preparation.
    pub ignored_attributes: Vec<String>,
    /// Kept in storage but dropped when the table is loaded for sampling.
    pub irrelevant_attributes: Vec<String>,
    /// Never removed by functional-dependency compression.
    pub no_compress: Vec<String>,
    pub(crate) incoming_relationships: Vec<String>,
    pub(crate) outgoing_relationships: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            null_indicator: format!("{name}_is_null"),
            name,
            attributes: Vec::new(),
            primary_keys: vec!["id".to_string()],
            size: 1000,
            sample_rate: 1.0,
            dependency_rules: Vec::new(),
            ignored_attributes: Vec::new(),
            irrelevant_attributes: Vec::new(),
            no_compress: Vec::new(),
            incoming_relationships: Vec::new(),
            outgoing_relationships: Vec::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: &[&str]) -> Self {
        self.attributes = attributes.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_primary_keys(mut self, keys: &[&str]) -> Self {
        self.primary_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f64) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_null_indicator(mut self, null_indicator: impl Into<String>) -> Self {
        self.null_indicator = null_indicator.into();
        self
    }

    /// Declares that `source` functionally determines `dest`. Both are plain attribute names.
    pub fn with_dependency(mut self, source: &str, dest: &str) -> Self {
        self.dependency_rules.push((qualify(&self.name, source), qualify(&self.name, dest)));
        self
    }

    pub fn with_ignored_attributes(mut self, attributes: &[&str]) -> Self {
        self.ignored_attributes = attributes.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_irrelevant_attributes(mut self, attributes: &[&str]) -> Self {
        self.irrelevant_attributes = attributes.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_no_compress(mut self, attributes: &[&str]) -> Self {
        self.no_compress = attributes.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Qualified attributes functionally determined by `attribute` (itself qualified).
    pub fn dependents_of(&self, attribute: &str) -> Vec<&str> {
        self.dependency_rules.iter().filter(|(source, _)| source == attribute).map(|(_, dest)| dest.as_str()).collect()
    }

    /// Qualified attributes that functionally determine `attribute` (itself qualified).
    pub fn determinants_of(&self, attribute: &str) -> Vec<&str> {
        self.dependency_rules.iter().filter(|(_, dest)| dest == attribute).map(|(source, _)| source.as_str()).collect()
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.attributes.iter().any(|a| a == attribute)
    }

    pub fn qualified_attributes(&self) -> Vec<String> {
        self.attributes.iter().map(|a| qualify(&self.name, a)).collect()
    }

    pub fn qualified_null_indicator(&self) -> String {
        qualify(&self.name, &self.null_indicator)
    }

    /// Identifiers of relationships that reference this table.
    pub fn incoming_relationships(&self) -> &[String] {
        &self.incoming_relationships
    }

    /// Identifiers of relationships through which this table references others.
    pub fn outgoing_relationships(&self) -> &[String] {
        &self.outgoing_relationships
    }

    pub fn single_primary_key(&self) -> Option<&str> {
        match self.primary_keys.as_slice() {
            [key] => Some(key.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let table = Table::new("orders");
        assert_eq!(table.primary_keys, vec!["id"]);
        assert_eq!(table.null_indicator, "orders_is_null");
        assert_eq!(table.qualified_null_indicator(), "orders.orders_is_null");
        assert_eq!(table.sample_rate, 1.0);
        assert_eq!(table.single_primary_key(), Some("id"));
    }

    #[test]
    fn test_dependency_helpers() {
        let table = Table::new("customers")
            .with_attributes(&["id", "city", "region", "nation"])
            .with_dependency("city", "region")
            .with_dependency("city", "nation")
            .with_dependency("nation", "region");

        assert_eq!(table.dependents_of("customers.city"), vec!["customers.region", "customers.nation"]);
        assert_eq!(table.determinants_of("customers.region"), vec!["customers.city", "customers.nation"]);
        assert!(table.dependents_of("customers.region").is_empty());
    }
}
