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
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{Condition, QueryResult};
use crate::schema::{SchemaError, SchemaGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryType {
    Aqp,
    Cardinality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    Sum,
    Avg,
    Count,
}

/// How an aggregation combines with the ones before it, e.g. `SUM(a) - SUM(b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationOperation {
    Plus,
    Minus,
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Aggregation {
    pub kind: AggregationType,
    /// `None` for `COUNT(*)`.
    pub attribute: Option<AttributeRef>,
}

impl Aggregation {
    pub fn sum(table: &str, attribute: &str) -> Self {
        Self {
            kind: AggregationType::Sum,
            attribute: Some(AttributeRef::new(table, attribute)),
        }
    }

    pub fn avg(table: &str, attribute: &str) -> Self {
        Self {
            kind: AggregationType::Avg,
            attribute: Some(AttributeRef::new(table, attribute)),
        }
    }

    pub fn count() -> Self {
        Self {
            kind: AggregationType::Count,
            attribute: None,
        }
    }
}

/// A cardinality or aggregate query over a join of schema tables.
///
/// Built incrementally; once handed to an evaluator it is not mutated again.
#[derive(Debug, Clone)]
pub struct Query {
    graph: Arc<SchemaGraph>,
    pub query_type: QueryType,
    pub tables: BTreeSet<String>,
    pub relationships: BTreeSet<String>,
    pub table_conditions: BTreeMap<String, Vec<Condition>>,
    pub conditions: Vec<Condition>,
    pub aggregations: Vec<(AggregationOperation, Option<Aggregation>)>,
    pub group_by: Vec<AttributeRef>,
}

impl Query {
    pub fn new(graph: Arc<SchemaGraph>, query_type: QueryType) -> Self {
        Self {
            graph,
            query_type,
            tables: BTreeSet::new(),
            relationships: BTreeSet::new(),
            table_conditions: BTreeMap::new(),
            conditions: Vec::new(),
            aggregations: Vec::new(),
            group_by: Vec::new(),
        }
    }

    pub fn cardinality(graph: Arc<SchemaGraph>) -> Self {
        Self::new(graph, QueryType::Cardinality)
    }

    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn shared_graph(&self) -> Arc<SchemaGraph> {
        Arc::clone(&self.graph)
    }

    fn check_attribute(&self, table: &str, attribute: &str) -> QueryResult<()> {
        if !self.graph.table(table)?.has_attribute(attribute) {
            return Err(SchemaError::UnknownAttribute {
                table: table.to_string(),
                attribute: attribute.to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn add_table(&mut self, table: &str) -> QueryResult<()> {
        self.graph.table(table)?;
        self.tables.insert(table.to_string());
        Ok(())
    }

    /// Adds a filter. The condition's table joins the query if it was not part of it yet.
    pub fn add_condition(&mut self, condition: Condition) -> QueryResult<()> {
        self.check_attribute(&condition.table, &condition.attribute)?;
        self.tables.insert(condition.table.clone());
        self.table_conditions.entry(condition.table.clone()).or_default().push(condition.clone());
        self.conditions.push(condition);
        Ok(())
    }

    /// Parses `text` with [`Condition::parse`] and adds it.
    pub fn add_condition_str(&mut self, table: &str, text: &str) -> QueryResult<()> {
        self.add_condition(Condition::parse(table, text)?)
    }

    pub fn add_group_by(&mut self, table: &str, attribute: &str) -> QueryResult<()> {
        self.check_attribute(table, attribute)?;
        self.group_by.push(AttributeRef::new(table, attribute));
        Ok(())
    }

    pub fn add_aggregation(&mut self, operation: AggregationOperation, aggregation: Option<Aggregation>) -> QueryResult<()> {
        if let Some(AttributeRef { table, attribute }) = aggregation.as_ref().and_then(|a| a.attribute.as_ref()) {
            self.check_attribute(table, attribute)?;
        }
        self.aggregations.push((operation, aggregation));
        Ok(())
    }

    /// Joins along a relationship, adding both of its tables.
    pub fn add_relationship(&mut self, identifier: &str) -> QueryResult<()> {
        let relationship = self.graph.relationship(identifier)?;
        self.tables.insert(relationship.source.clone());
        self.tables.insert(relationship.target.clone());
        self.relationships.insert(identifier.to_string());
        Ok(())
    }

    /// The same join and filters as a plain cardinality query, without aggregations or grouping.
    pub fn copy_for_cardinality(&self) -> Query {
        Query {
            graph: Arc::clone(&self.graph),
            query_type: QueryType::Cardinality,
            tables: self.tables.clone(),
            relationships: self.relationships.clone(),
            table_conditions: self.table_conditions.clone(),
            conditions: self.conditions.clone(),
            aggregations: Vec::new(),
            group_by: Vec::new(),
        }
    }

    pub fn conditions_on(&self, table: &str) -> &[Condition] {
        self.table_conditions.get(table).map(Vec::as_slice).unwrap_or(&[])
    }
}
