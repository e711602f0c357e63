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

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::{Relationship, SchemaError, SchemaResult, Table};

/// Owns every table and foreign-key relationship of a schema.
///
/// Built once, then shared read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaGraph {
    tables: Vec<Table>,
    relationships: Vec<Relationship>,
    table_index: HashMap<String, usize>,
    relationship_index: HashMap<String, usize>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Table) -> SchemaResult<()> {
        if self.table_index.contains_key(&table.name) {
            return Err(SchemaError::DuplicateTable(table.name));
        }
        if !(table.sample_rate > 0.0 && table.sample_rate <= 1.0) {
            return Err(SchemaError::InvalidTable {
                table: table.name,
                reason: format!("sample rate {} outside (0, 1]", table.sample_rate),
            });
        }
        if !table.attributes.is_empty() {
            let prefix = format!("{}.", table.name);
            for (source, dest) in &table.dependency_rules {
                for qualified in [source, dest] {
                    let attribute = qualified.strip_prefix(prefix.as_str()).unwrap_or(qualified.as_str());
                    if !table.has_attribute(attribute) {
                        return Err(SchemaError::UnknownAttribute {
                            table: table.name.clone(),
                            attribute: attribute.to_string(),
                        });
                    }
                }
            }
        }

        debug!("Adding table {} with {} attributes", table.name, table.attributes.len());
        self.table_index.insert(table.name.clone(), self.tables.len());
        self.tables.push(table);
        Ok(())
    }

    /// Registers `source.source_attribute -> target.target_attribute` and returns its identifier.
    ///
    /// Both endpoint tables must already be in the graph. When the multiplier name is omitted
    /// it defaults to `mul_<source>.<source_attribute>`.
    pub fn add_relationship(&mut self, source: &str, source_attribute: &str, target: &str, target_attribute: &str, multiplier_name: Option<&str>) -> SchemaResult<String> {
        let source_idx = *self.table_index.get(source).ok_or_else(|| SchemaError::UnknownTable(source.to_string()))?;
        let target_idx = *self.table_index.get(target).ok_or_else(|| SchemaError::UnknownTable(target.to_string()))?;

        for (idx, attribute) in [(source_idx, source_attribute), (target_idx, target_attribute)] {
            let table = &self.tables[idx];
            if !table.attributes.is_empty() && !table.has_attribute(attribute) {
                return Err(SchemaError::UnknownAttribute {
                    table: table.name.clone(),
                    attribute: attribute.to_string(),
                });
            }
        }

        let relationship = Relationship::new(source, source_attribute, target, target_attribute, multiplier_name);
        if self.relationship_index.contains_key(&relationship.identifier) {
            return Err(SchemaError::DuplicateRelationship(relationship.identifier));
        }

        let identifier = relationship.identifier.clone();
        self.tables[source_idx].outgoing_relationships.push(identifier.clone());
        self.tables[target_idx].incoming_relationships.push(identifier.clone());
        self.relationship_index.insert(identifier.clone(), self.relationships.len());
        self.relationships.push(relationship);

        debug!("Added relationship {}", identifier);
        Ok(identifier)
    }

    pub fn table(&self, name: &str) -> SchemaResult<&Table> {
        self.table_index.get(name).map(|&idx| &self.tables[idx]).ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    pub fn relationship(&self, identifier: &str) -> SchemaResult<&Relationship> {
        self.relationship_index
            .get(identifier)
            .map(|&idx| &self.relationships[idx])
            .ok_or_else(|| SchemaError::UnknownRelationship(identifier.to_string()))
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table_index.contains_key(name)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Relationships where `table` is the referenced (target) side.
    pub fn incoming_relationships(&self, table: &str) -> SchemaResult<Vec<&Relationship>> {
        self.table(table)?.incoming_relationships.iter().map(|id| self.relationship(id)).collect()
    }

    /// Relationships where `table` is the referencing (source) side.
    pub fn outgoing_relationships(&self, table: &str) -> SchemaResult<Vec<&Relationship>> {
        self.table(table)?.outgoing_relationships.iter().map(|id| self.relationship(id)).collect()
    }

    /// Qualified attributes functionally determined by `table.attribute`.
    pub fn dependents_of(&self, table: &str, attribute: &str) -> SchemaResult<Vec<String>> {
        let table = self.table(table)?;
        let qualified = aqpdb_common::qualify(&table.name, attribute);
        Ok(table.dependents_of(&qualified).into_iter().map(str::to_string).collect())
    }

    /// Qualified attributes that functionally determine `table.attribute`.
    pub fn determinants_of(&self, table: &str, attribute: &str) -> SchemaResult<Vec<String>> {
        let table = self.table(table)?;
        let qualified = aqpdb_common::qualify(&table.name, attribute);
        Ok(table.determinants_of(&qualified).into_iter().map(str::to_string).collect())
    }

    /// Whether a qualified column name is a multiplier (or its defined variant) of some relationship.
    pub fn is_multiplier(&self, qualified: &str) -> bool {
        self.relationships.iter().any(|r| r.multiplier_column() == qualified || r.multiplier_nn_column() == qualified)
    }

    /// Tables touched by the given relationships, in order of first appearance.
    pub fn tables_of(&self, relationship_ids: &[String]) -> SchemaResult<Vec<String>> {
        let mut tables: Vec<String> = Vec::new();
        for id in relationship_ids {
            let relationship = self.relationship(id)?;
            for name in [&relationship.source, &relationship.target] {
                if !tables.contains(name) {
                    tables.push(name.clone());
                }
            }
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shop_schema() -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        graph.add_table(Table::new("customers").with_attributes(&["id", "region"])).unwrap();
        graph.add_table(Table::new("orders").with_attributes(&["id", "customer_id"])).unwrap();
        graph
    }

    #[test]
    fn test_add_relationship_registers_back_references() {
        let mut graph = shop_schema();
        let id = graph.add_relationship("orders", "customer_id", "customers", "id", None).unwrap();

        assert_eq!(id, "orders.customer_id = customers.id");
        assert_eq!(graph.table("customers").unwrap().incoming_relationships(), [id.clone()]);
        assert_eq!(graph.table("orders").unwrap().outgoing_relationships(), [id.clone()]);
        assert_eq!(graph.relationship(&id).unwrap().target, "customers");
        assert!(graph.is_multiplier("customers.mul_orders.customer_id"));
        assert!(graph.is_multiplier("customers.mul_orders.customer_id_nn"));
        assert!(!graph.is_multiplier("customers.region"));
    }

    #[test]
    fn test_unknown_table_rejected() {
        let mut graph = shop_schema();
        let result = graph.add_relationship("orders", "customer_id", "suppliers", "id", None);
        assert!(matches!(result, Err(SchemaError::UnknownTable(name)) if name == "suppliers"));
        assert!(graph.relationships().is_empty());
        assert!(graph.table("customers").unwrap().incoming_relationships().is_empty());
    }

    #[test]
    fn test_unknown_attribute_rejected() {
        let mut graph = shop_schema();
        let result = graph.add_relationship("orders", "cust", "customers", "id", None);
        assert!(matches!(result, Err(SchemaError::UnknownAttribute { .. })));
    }

    #[test]
    fn test_duplicates_rejected() {
        let mut graph = shop_schema();
        assert!(matches!(graph.add_table(Table::new("orders")), Err(SchemaError::DuplicateTable(_))));

        graph.add_relationship("orders", "customer_id", "customers", "id", None).unwrap();
        let again = graph.add_relationship("orders", "customer_id", "customers", "id", Some("other"));
        assert!(matches!(again, Err(SchemaError::DuplicateRelationship(_))));
    }

    #[test]
    fn test_invalid_sample_rate_rejected() {
        let mut graph = SchemaGraph::new();
        let result = graph.add_table(Table::new("facts").with_sample_rate(0.0));
        assert!(matches!(result, Err(SchemaError::InvalidTable { .. })));
    }

    #[test]
    fn test_dependency_rule_attributes_checked() {
        let mut graph = SchemaGraph::new();
        let table = Table::new("customers").with_attributes(&["id", "city"]).with_dependency("city", "region");
        assert!(matches!(graph.add_table(table), Err(SchemaError::UnknownAttribute { attribute, .. }) if attribute == "region"));
    }

    #[test]
    fn test_graph_dependency_queries() {
        let mut graph = SchemaGraph::new();
        graph
            .add_table(Table::new("customers").with_attributes(&["id", "city", "region"]).with_dependency("city", "region"))
            .unwrap();

        assert_eq!(graph.dependents_of("customers", "city").unwrap(), vec!["customers.region"]);
        assert_eq!(graph.determinants_of("customers", "region").unwrap(), vec!["customers.city"]);
        assert!(graph.dependents_of("orders", "id").is_err());
    }
}
