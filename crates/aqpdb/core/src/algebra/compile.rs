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
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

use super::{AlgebraError, AlgebraResult, DensityModel, Expectation, Factor, IndicatorExpectation, Probability};
use crate::query::{Aggregation, AggregationOperation, AggregationType, Condition, Operator, Query};
use crate::schema::SchemaGraph;

/// `scale * ∏factors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Formula {
    pub scale: f64,
    pub factors: Vec<Factor>,
}

impl Formula {
    pub fn needs_grouping(&self, group_by: &[AttributeRef]) -> bool {
        self.factors.iter().any(|factor| factor.contains_group_by(group_by))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.scale)?;
        for factor in &self.factors {
            write!(f, "{factor}")?;
        }
        Ok(())
    }
}

/// Signed formulas whose sum answers an aggregate query, e.g. `SUM(a) - SUM(b)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledAggregate {
    pub parts: Vec<(f64, Formula)>,
}

/// Multipliers that undo the fan-out of model tables outside the query.
///
/// Walks outward from the query tables along the model's relationships; every step onto a
/// referencing table duplicated the rows it came from, so its `_nn` multiplier goes into the
/// denominator.
fn normalizing_multipliers(graph: &SchemaGraph, query: &Query, model: &dyn DensityModel) -> AlgebraResult<Vec<AttributeRef>> {
    let mut reached: BTreeSet<String> = query.tables.clone();
    let mut pending: Vec<String> = model.relationships().into_iter().collect();
    let mut multipliers = Vec::new();

    loop {
        let mut progressed = false;
        let mut unreached = Vec::new();
        for id in pending {
            let relationship = graph.relationship(&id)?;
            match (reached.contains(&relationship.source), reached.contains(&relationship.target)) {
                (false, true) => {
                    multipliers.push(relationship.multiplier_nn());
                    reached.insert(relationship.source.clone());
                    progressed = true;
                }
                (true, false) => {
                    reached.insert(relationship.target.clone());
                    progressed = true;
                }
                (true, true) => {}
                (false, false) => unreached.push(id),
            }
        }
        if !progressed || unreached.is_empty() {
            return Ok(multipliers);
        }
        pending = unreached;
    }
}

/// Conditions of the query, plus presence of every query table when the model spans a join.
fn term_conditions(graph: &SchemaGraph, query: &Query, model_tables: &BTreeSet<String>) -> AlgebraResult<Vec<Condition>> {
    let mut conditions = query.conditions.clone();
    if model_tables.len() > 1 {
        for table in &query.tables {
            let null_indicator = &graph.table(table)?.null_indicator;
            conditions.push(Condition::new(table.clone(), null_indicator.clone(), Operator::Eq, 0_i64));
        }
    }
    Ok(conditions)
}

fn check_coverage(query: &Query, model: &dyn DensityModel) -> AlgebraResult<BTreeSet<String>> {
    let tables = model.tables();
    if !query.tables.is_subset(&tables) || !query.relationships.is_subset(&model.relationships()) {
        return Err(AlgebraError::NoCoveringModel(query.tables.iter().cloned().collect()));
    }
    Ok(tables)
}

/// Compiles `COUNT(*)` of the query's join and filters against `model`.
///
/// With the model exactly covering one queried table this is `|T| * P(conditions)`; otherwise
/// `full_join_size * E(1 / ∏multipliers * 1_{conditions})`.
pub fn compile_cardinality(query: &Query, model: &dyn DensityModel) -> AlgebraResult<Formula> {
    let graph = query.graph();
    let tables = check_coverage(query, model)?;
    let full_join_size = model.full_join_size();

    if tables.len() == 1 {
        return Ok(Formula {
            scale: full_join_size,
            factors: vec![Factor::Probability(Probability::new(query.conditions.clone()))],
        });
    }

    let term = IndicatorExpectation::new(normalizing_multipliers(graph, query, model)?, term_conditions(graph, query, &tables)?)
        .with_tables(tables)
        .with_full_join_size(full_join_size);
    let formula = Formula {
        scale: full_join_size,
        factors: vec![Factor::Indicator(term)],
    };
    debug!("Compiled cardinality: {}", formula);
    Ok(formula)
}

fn compile_single(query: &Query, model: &dyn DensityModel, aggregation: &Aggregation) -> AlgebraResult<Formula> {
    let graph = query.graph();
    let tables = check_coverage(query, model)?;
    let full_join_size = model.full_join_size();

    let feature = match (&aggregation.kind, &aggregation.attribute) {
        (AggregationType::Count, _) => return compile_cardinality(query, model),
        (_, Some(feature)) => feature.clone(),
        (kind, None) => return Err(AlgebraError::UnsupportedAggregation(format!("{kind:?} without an attribute"))),
    };
    if !tables.contains(&feature.table) {
        return Err(AlgebraError::NoCoveringModel(vec![feature.table]));
    }

    let denominator = normalizing_multipliers(graph, query, model)?;
    let conditions = term_conditions(graph, query, &tables)?;
    let indicator = |numerator: Vec<AttributeRef>| {
        IndicatorExpectation::new(denominator.clone(), conditions.clone())
            .with_numerator(numerator)
            .with_tables(tables.clone())
            .with_full_join_size(full_join_size)
    };

    let formula = match aggregation.kind {
        AggregationType::Sum => Formula {
            scale: full_join_size,
            factors: vec![Factor::Indicator(indicator(vec![feature]))],
        },
        AggregationType::Avg if denominator.is_empty() => Formula {
            scale: 1.0,
            factors: vec![Factor::Expectation(Expectation::new(vec![feature], Vec::new(), conditions.clone()).with_tables(tables.clone()))],
        },
        AggregationType::Avg => Formula {
            scale: 1.0,
            factors: vec![Factor::Indicator(indicator(vec![feature])), Factor::Indicator(indicator(Vec::new()).inverted())],
        },
        AggregationType::Count => return compile_cardinality(query, model),
    };
    debug!("Compiled {:?}: {}", aggregation.kind, formula);
    Ok(formula)
}

/// Compiles every aggregation of the query, honouring `Plus`/`Minus` separators between them.
pub fn compile_aggregate(query: &Query, model: &dyn DensityModel) -> AlgebraResult<CompiledAggregate> {
    let mut parts = Vec::new();
    let mut sign = 1.0;
    for (operation, aggregation) in &query.aggregations {
        match (operation, aggregation) {
            (AggregationOperation::Plus, _) => sign = 1.0,
            (AggregationOperation::Minus, _) => sign = -1.0,
            (AggregationOperation::Aggregate, Some(aggregation)) => {
                parts.push((sign, compile_single(query, model, aggregation)?));
                sign = 1.0;
            }
            (AggregationOperation::Aggregate, None) => return Err(AlgebraError::UnsupportedAggregation("aggregate without a function".to_string())),
        }
    }
    if parts.is_empty() {
        return Err(AlgebraError::UnsupportedAggregation("query has no aggregation".to_string()));
    }
    Ok(CompiledAggregate { parts })
}
