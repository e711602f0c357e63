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
use std::collections::HashSet;

use super::{SchemaError, SchemaGraph, SchemaResult};

/// How a relationship extends the set of already joined tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinDirection {
    /// The referenced table is joined; each of its rows fans out to the referencing rows.
    FanOut,
    /// The referencing table is joined; each row picks up the row it references.
    Lookup,
    /// Both ends are already joined; the relationship only filters.
    Cycle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinStep {
    pub relationship: String,
    pub direction: JoinDirection,
    /// Table added by this step, `None` for [`JoinDirection::Cycle`].
    pub new_table: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPath {
    pub start: String,
    pub steps: Vec<JoinStep>,
}

impl JoinPath {
    /// Tables in the order they enter the join.
    pub fn tables(&self) -> Vec<&str> {
        std::iter::once(self.start.as_str()).chain(self.steps.iter().filter_map(|s| s.new_table.as_deref())).collect()
    }
}

/// Orders `relationship_ids` into a chain starting at `start`.
///
/// At every step the first remaining relationship that touches the joined tables is taken.
/// If none does, the request named relationships that do not chain together.
pub fn assemble_join_path(graph: &SchemaGraph, start: &str, relationship_ids: &[String]) -> SchemaResult<JoinPath> {
    graph.table(start)?;

    let mut joined: HashSet<String> = HashSet::from([start.to_string()]);
    let mut remaining: Vec<&String> = relationship_ids.iter().collect();
    let mut steps = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let mut next = None;
        for (pos, id) in remaining.iter().enumerate() {
            let relationship = graph.relationship(id)?;
            let source_joined = joined.contains(&relationship.source);
            let target_joined = joined.contains(&relationship.target);
            let step = match (source_joined, target_joined) {
                (true, true) => JoinStep {
                    relationship: relationship.identifier.clone(),
                    direction: JoinDirection::Cycle,
                    new_table: None,
                },
                (false, true) => JoinStep {
                    relationship: relationship.identifier.clone(),
                    direction: JoinDirection::FanOut,
                    new_table: Some(relationship.source.clone()),
                },
                (true, false) => JoinStep {
                    relationship: relationship.identifier.clone(),
                    direction: JoinDirection::Lookup,
                    new_table: Some(relationship.target.clone()),
                },
                (false, false) => continue,
            };
            next = Some((pos, step));
            break;
        }

        let Some((pos, step)) = next else {
            let mut joined: Vec<String> = joined.into_iter().collect();
            joined.sort();
            return Err(SchemaError::NoJoinPath {
                joined,
                remaining: remaining.into_iter().cloned().collect(),
            });
        };

        if let Some(table) = &step.new_table {
            joined.insert(table.clone());
        }
        remaining.remove(pos);
        steps.push(step);
    }

    Ok(JoinPath {
        start: start.to_string(),
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;

    fn star_schema() -> (SchemaGraph, Vec<String>) {
        let mut graph = SchemaGraph::new();
        graph.add_table(Table::new("customers")).unwrap();
        graph.add_table(Table::new("orders")).unwrap();
        graph.add_table(Table::new("items")).unwrap();
        graph.add_table(Table::new("suppliers")).unwrap();
        let ids = vec![
            graph.add_relationship("orders", "customer_id", "customers", "id", None).unwrap(),
            graph.add_relationship("items", "order_id", "orders", "id", None).unwrap(),
            graph.add_relationship("items", "supplier_id", "suppliers", "id", None).unwrap(),
        ];
        (graph, ids)
    }

    #[test]
    fn test_path_from_root() {
        let (graph, ids) = star_schema();
        let path = assemble_join_path(&graph, "customers", &ids).unwrap();

        assert_eq!(path.tables(), vec!["customers", "orders", "items", "suppliers"]);
        assert_eq!(path.steps[0].direction, JoinDirection::FanOut);
        assert_eq!(path.steps[2].direction, JoinDirection::Lookup);
    }

    #[test]
    fn test_path_reorders_relationships() {
        let (graph, ids) = star_schema();
        let reversed: Vec<String> = ids.iter().rev().cloned().collect();
        let path = assemble_join_path(&graph, "customers", &reversed).unwrap();

        assert_eq!(path.steps[0].relationship, ids[0]);
        assert_eq!(path.steps.len(), 3);
    }

    #[test]
    fn test_disconnected_relationships_fail() {
        let (graph, ids) = star_schema();
        let result = assemble_join_path(&graph, "customers", &[ids[0].clone(), ids[2].clone()]);
        match result {
            Err(SchemaError::NoJoinPath { joined, remaining }) => {
                assert_eq!(joined, vec!["customers", "orders"]);
                assert_eq!(remaining, vec![ids[2].clone()]);
            }
            other => panic!("expected NoJoinPath, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_edge_becomes_filter() {
        let mut graph = SchemaGraph::new();
        graph.add_table(Table::new("a")).unwrap();
        graph.add_table(Table::new("b")).unwrap();
        let first = graph.add_relationship("a", "b_id", "b", "id", None).unwrap();
        let second = graph.add_relationship("b", "a_id", "a", "id", None).unwrap();

        let path = assemble_join_path(&graph, "a", &[first, second]).unwrap();
        assert_eq!(path.steps[1].direction, JoinDirection::Cycle);
        assert_eq!(path.tables(), vec!["a", "b"]);
    }
}
