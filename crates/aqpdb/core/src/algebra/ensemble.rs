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

use aqpdb_common::Value;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

use super::{AlgebraError, AlgebraResult, DensityModel, Factor, Formula, TermMemo, compile_aggregate, compile_cardinality};
use crate::query::{Condition, Operator, Query};

/// A set of density models answering queries together, sharing evaluated terms.
#[derive(Default)]
pub struct Ensemble {
    models: Vec<Arc<dyn DensityModel>>,
    memo: TermMemo,
}

impl Ensemble {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: Arc<dyn DensityModel>) -> Self {
        self.add_model(model);
        self
    }

    pub fn add_model(&mut self, model: Arc<dyn DensityModel>) {
        info!("Adding model {} over {:?}", model.name(), model.tables());
        self.models.push(model);
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn memo(&self) -> &TermMemo {
        &self.memo
    }

    /// The model with the fewest tables among those spanning all of the query's tables and relationships.
    pub fn covering_model(&self, query: &Query) -> AlgebraResult<&dyn DensityModel> {
        let mut best: Option<(usize, &dyn DensityModel)> = None;
        for model in &self.models {
            let tables = model.tables();
            if !query.tables.is_subset(&tables) || !query.relationships.is_subset(&model.relationships()) {
                continue;
            }
            if best.is_none_or(|(size, _)| tables.len() < size) {
                best = Some((tables.len(), model.as_ref()));
            }
        }
        best.map(|(_, model)| model).ok_or_else(|| AlgebraError::NoCoveringModel(query.tables.iter().cloned().collect()))
    }

    pub fn evaluate(&self, formula: &Formula, model: &dyn DensityModel) -> AlgebraResult<f64> {
        let mut value = formula.scale;
        for factor in &formula.factors {
            value *= match factor {
                Factor::Indicator(term) => self.memo.get_or_evaluate(term, |term| {
                    let raw = model.indicator_expectation(term)?;
                    term.finish(raw).ok_or_else(|| AlgebraError::ZeroExpectation(term.to_string()))
                })?,
                Factor::Expectation(term) => model.expectation(term)?,
                Factor::Probability(term) => model.probability(term)?,
            };
        }
        debug!("{} = {}", formula, value);
        Ok(value)
    }

    pub fn cardinality(&self, query: &Query) -> AlgebraResult<f64> {
        let model = self.covering_model(query)?;
        let formula = compile_cardinality(query, model)?;
        self.evaluate(&formula, model)
    }

    pub fn aggregate(&self, query: &Query) -> AlgebraResult<f64> {
        let model = self.covering_model(query)?;
        let compiled = compile_aggregate(query, model)?;
        let mut total = 0.0;
        for (sign, formula) in &compiled.parts {
            total += sign * self.evaluate(formula, model)?;
        }
        Ok(total)
    }

    /// Aggregate if the query has aggregations, cardinality otherwise.
    pub fn answer(&self, query: &Query) -> AlgebraResult<f64> {
        if query.aggregations.is_empty() { self.cardinality(query) } else { self.aggregate(query) }
    }

    /// Answers the query once per group, each group given as one value per group-by attribute.
    ///
    /// Every group is compiled with its own equality conditions, so each of its terms is specific
    /// to that group. Only repeated groups are answered from the memo.
    pub fn answer_grouped(&self, query: &Query, groups: &[Vec<Value>]) -> AlgebraResult<Vec<(Vec<Value>, f64)>> {
        groups
            .iter()
            .map(|group| {
                if group.len() != query.group_by.len() {
                    return Err(AlgebraError::GroupArity {
                        expected: query.group_by.len(),
                        found: group.len(),
                    });
                }
                let mut grouped = query.clone();
                grouped.group_by.clear();
                for (attribute, value) in query.group_by.iter().zip(group) {
                    grouped.add_condition(Condition::new(attribute.table.clone(), attribute.attribute.clone(), Operator::Eq, value.clone()))?;
                }
                Ok((group.clone(), self.answer(&grouped)?))
            })
            .collect()
    }

    /// Answers many queries in parallel. Results keep the input order.
    pub fn answer_all(&self, queries: &[Query]) -> Vec<AlgebraResult<f64>> {
        queries.par_iter().map(|query| self.answer(query)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::MockDensityModel;
    use crate::query::{Aggregation, AggregationOperation, QueryType};
    use crate::schema::{SchemaGraph, Table};
    use aqpdb_common::AttributeRef;
    use std::collections::BTreeSet;

    const ORDER_CUSTOMER: &str = "orders.customer_id = customers.id";

    fn graph() -> Arc<SchemaGraph> {
        let mut graph = SchemaGraph::new();
        graph.add_table(Table::new("customers").with_attributes(&["id", "region", "age"])).unwrap();
        graph.add_table(Table::new("orders").with_attributes(&["id", "customer_id", "amount"])).unwrap();
        graph.add_relationship("orders", "customer_id", "customers", "id", None).unwrap();
        Arc::new(graph)
    }

    fn model(name: &str, tables: &[&str], relationships: &[&str], full_join_size: f64) -> MockDensityModel {
        let name = name.to_string();
        let tables: BTreeSet<String> = tables.iter().map(|t| t.to_string()).collect();
        let relationships: BTreeSet<String> = relationships.iter().map(|r| r.to_string()).collect();
        let mut model = MockDensityModel::new();
        model.expect_name().returning(move || name.clone());
        model.expect_tables().returning(move || tables.clone());
        model.expect_relationships().returning(move || relationships.clone());
        model.expect_full_join_size().returning(move || full_join_size);
        model
    }

    #[test]
    fn test_smallest_covering_model_wins() {
        let mut single = model("customers", &["customers"], &[], 100.0);
        single.expect_probability().returning(|_| Ok(0.25));
        let join = model("join", &["customers", "orders"], &[ORDER_CUSTOMER], 400.0);
        let ensemble = Ensemble::new().with_model(Arc::new(join)).with_model(Arc::new(single));

        let mut query = Query::cardinality(graph());
        query.add_condition_str("customers", "age > 30").unwrap();
        assert_eq!(ensemble.covering_model(&query).unwrap().name(), "customers");
        assert_eq!(ensemble.cardinality(&query).unwrap(), 25.0);

        let mut joined = Query::cardinality(graph());
        joined.add_relationship(ORDER_CUSTOMER).unwrap();
        assert_eq!(ensemble.covering_model(&joined).unwrap().name(), "join");
    }

    #[test]
    fn test_no_covering_model() {
        let ensemble = Ensemble::new().with_model(Arc::new(model("customers", &["customers"], &[], 100.0)));
        let mut query = Query::cardinality(graph());
        query.add_relationship(ORDER_CUSTOMER).unwrap();
        assert!(matches!(ensemble.cardinality(&query), Err(AlgebraError::NoCoveringModel(_))));
    }

    #[test]
    fn test_avg_reuses_count_term() {
        let mut join = model("join", &["customers", "orders"], &[ORDER_CUSTOMER], 400.0);
        join.expect_indicator_expectation()
            .times(2)
            .returning(|term| Ok(if term.numerator_multipliers.is_empty() { 0.5 } else { 20.0 }));
        let ensemble = Ensemble::new().with_model(Arc::new(join));

        let mut count = Query::new(graph(), QueryType::Aqp);
        count.add_condition_str("customers", "age > 30").unwrap();
        count.add_aggregation(AggregationOperation::Aggregate, Some(Aggregation::count())).unwrap();
        assert_eq!(ensemble.answer(&count).unwrap(), 200.0);

        let mut avg = Query::new(graph(), QueryType::Aqp);
        avg.add_condition_str("customers", "age > 30").unwrap();
        avg.add_aggregation(AggregationOperation::Aggregate, Some(Aggregation::avg("customers", "age"))).unwrap();
        assert_eq!(ensemble.answer(&avg).unwrap(), 40.0);
        assert_eq!(ensemble.memo().hits(), 1);
    }

    #[test]
    fn test_zero_denominator_is_an_error() {
        let mut join = model("join", &["customers", "orders"], &[ORDER_CUSTOMER], 0.0);
        join.expect_indicator_expectation().returning(|_| Ok(0.0));
        let ensemble = Ensemble::new().with_model(Arc::new(join));

        let mut avg = Query::new(graph(), QueryType::Aqp);
        avg.add_condition_str("customers", "age > 30").unwrap();
        avg.add_aggregation(AggregationOperation::Aggregate, Some(Aggregation::avg("customers", "age"))).unwrap();
        assert!(matches!(ensemble.answer(&avg), Err(AlgebraError::ZeroExpectation(_))));
    }

    #[test]
    fn test_grouped_answers() {
        let mut single = model("customers", &["customers"], &[], 100.0);
        single
            .expect_probability()
            .returning(|term| Ok(if term.conditions.iter().any(|c| c.to_string() == "customers.region = 'EU'") { 0.3 } else { 0.7 }));
        let ensemble = Ensemble::new().with_model(Arc::new(single));

        let mut query = Query::cardinality(graph());
        query.add_group_by("customers", "region").unwrap();
        let answers = ensemble.answer_grouped(&query, &[vec!["EU".into()], vec!["US".into()]]).unwrap();
        assert_eq!(answers[0].1, 30.0);
        assert_eq!(answers[1].1, 70.0);

        let err = ensemble.answer_grouped(&query, &[vec![]]).unwrap_err();
        assert!(matches!(err, AlgebraError::GroupArity { expected: 1, found: 0 }));
    }

    #[test]
    fn test_repeated_groups_come_from_the_memo() {
        let mut join = model("join", &["customers", "orders"], &[ORDER_CUSTOMER], 400.0);
        join.expect_indicator_expectation().times(2).returning(|_| Ok(0.25));
        let ensemble = Ensemble::new().with_model(Arc::new(join));

        let mut query = Query::cardinality(graph());
        query.add_relationship(ORDER_CUSTOMER).unwrap();
        query.add_group_by("customers", "region").unwrap();
        let groups = vec![vec![Value::from("EU")], vec![Value::from("US")], vec![Value::from("EU")]];
        let answers = ensemble.answer_grouped(&query, &groups).unwrap();

        assert!(answers.iter().all(|(_, answer)| *answer == 100.0));
        assert_eq!(ensemble.memo().hits(), 1);
        assert_eq!(ensemble.memo().len(), 2);
    }

    #[test]
    fn test_single_table_avg_is_a_plain_expectation() {
        let mut single = model("customers", &["customers"], &[], 100.0);
        single.expect_expectation().times(1).returning(|term| {
            assert_eq!(term.features, vec![AttributeRef::new("customers", "age")]);
            Ok(42.0)
        });
        let ensemble = Ensemble::new().with_model(Arc::new(single));

        let mut avg = Query::new(graph(), QueryType::Aqp);
        avg.add_condition_str("customers", "region = 'EU'").unwrap();
        avg.add_aggregation(AggregationOperation::Aggregate, Some(Aggregation::avg("customers", "age"))).unwrap();
        assert_eq!(ensemble.answer(&avg).unwrap(), 42.0);
    }

    #[test]
    fn test_parallel_answers_keep_order() {
        let mut single = model("customers", &["customers"], &[], 100.0);
        single.expect_probability().returning(|term| Ok(term.conditions.len() as f64 / 10.0));
        let ensemble = Ensemble::new().with_model(Arc::new(single));

        let queries: Vec<Query> = (0..6)
            .map(|n| {
                let mut query = Query::cardinality(graph());
                query.add_table("customers").unwrap();
                for age in 0..n {
                    query.add_condition_str("customers", &format!("age > {age}")).unwrap();
                }
                query
            })
            .collect();
        let answers: Vec<f64> = ensemble.answer_all(&queries).into_iter().map(Result::unwrap).collect();
        assert_eq!(answers, vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0]);
    }
}
