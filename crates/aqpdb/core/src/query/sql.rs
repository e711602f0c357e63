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

//! Rendering of queries as SQL for a physical database, used to obtain true counts when
//! evaluating estimates. Never on the estimation path.

use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::{Query, QueryError, QueryResult};
use crate::schema::{JoinDirection, SchemaGraph, assemble_join_path};

#[derive(Debug, Error)]
pub enum GroundTruthError {
    #[error("Ground truth query timed out after {0:?}")]
    Timeout(Duration),
    #[error("Ground truth backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Query(#[from] QueryError),
}

pub type GroundTruthResult<T> = Result<T, GroundTruthError>;

/// Renders `SELECT <select> FROM a JOIN b ON ... WHERE c1 AND c2` for the query's join and filters.
pub fn render_join_query(graph: &SchemaGraph, query: &Query, select: &str) -> QueryResult<String> {
    let ids: Vec<String> = query.relationships.iter().cloned().collect();
    let mut where_clauses: Vec<String> = Vec::new();

    let (from, joined) = if ids.is_empty() {
        let mut tables = query.tables.iter();
        match (tables.next(), tables.next()) {
            (Some(table), None) => (table.clone(), vec![table.clone()]),
            _ => return Err(QueryError::UnjoinedTables(query.tables.iter().cloned().collect())),
        }
    } else {
        let start = graph.tables_of(&ids)?.into_iter().next().ok_or_else(|| QueryError::UnjoinedTables(Vec::new()))?;
        let path = assemble_join_path(graph, &start, &ids)?;
        let mut from = start.clone();
        for step in &path.steps {
            let relationship = graph.relationship(&step.relationship)?;
            let on = format!("{} = {}", relationship.source_column(), relationship.target_column());
            match (&step.direction, &step.new_table) {
                (JoinDirection::Cycle, _) | (_, None) => where_clauses.push(on),
                (_, Some(table)) => from.push_str(&format!(" JOIN {table} ON {on}")),
            }
        }
        (from, path.tables().into_iter().map(str::to_string).collect::<Vec<_>>())
    };

    let unjoined: Vec<String> = query.tables.iter().filter(|t| !joined.contains(*t)).cloned().collect();
    if !unjoined.is_empty() {
        return Err(QueryError::UnjoinedTables(unjoined));
    }

    where_clauses.extend(query.conditions.iter().map(ToString::to_string));
    let mut sql = format!("SELECT {select} FROM {from}");
    if !where_clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&where_clauses.join(" AND "));
    }
    Ok(sql)
}

/// A physical database that can execute rendered queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroundTruth: Send + Sync {
    async fn count(&self, sql: &str) -> GroundTruthResult<u64>;
}

/// Renders `query` as a `COUNT(*)` statement and runs it, giving up after `limit`.
pub async fn count_with_timeout(backend: &dyn GroundTruth, query: &Query, limit: Duration) -> GroundTruthResult<(String, u64)> {
    let sql = render_join_query(query.graph(), query, "COUNT(*)")?;
    debug!("Ground truth: {}", sql);
    match tokio::time::timeout(limit, backend.count(&sql)).await {
        Ok(count) => Ok((sql, count?)),
        Err(_) => {
            warn!("Ground truth query timed out after {:?}: {}", limit, sql);
            Err(GroundTruthError::Timeout(limit))
        }
    }
}

/// Counts many queries concurrently, each under its own timeout. Results keep the input order.
pub async fn count_all(backend: &dyn GroundTruth, queries: &[Query], limit: Duration) -> Vec<GroundTruthResult<(String, u64)>> {
    join_all(queries.iter().map(|query| count_with_timeout(backend, query, limit))).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Condition, Operator};
    use crate::schema::Table;
    use std::sync::Arc;

    fn graph() -> Arc<SchemaGraph> {
        let mut graph = SchemaGraph::new();
        graph.add_table(Table::new("regions").with_attributes(&["id", "name"])).unwrap();
        graph.add_table(Table::new("customers").with_attributes(&["id", "region_id", "age"])).unwrap();
        graph.add_table(Table::new("orders").with_attributes(&["id", "customer_id", "amount"])).unwrap();
        graph.add_relationship("customers", "region_id", "regions", "id", None).unwrap();
        graph.add_relationship("orders", "customer_id", "customers", "id", None).unwrap();
        Arc::new(graph)
    }

    fn join_query() -> Query {
        let mut query = Query::cardinality(graph());
        query.add_relationship("orders.customer_id = customers.id").unwrap();
        query.add_condition_str("customers", "age > 30").unwrap();
        query.add_condition(Condition::new("orders", "amount", Operator::Le, 100_i64)).unwrap();
        query
    }

    struct Sleepy;

    #[async_trait]
    impl GroundTruth for Sleepy {
        async fn count(&self, _sql: &str) -> GroundTruthResult<u64> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(0)
        }
    }

    #[test]
    fn test_render_join() {
        let query = join_query();
        let sql = render_join_query(query.graph(), &query, "COUNT(*)").unwrap();
        assert_eq!(sql, "SELECT COUNT(*) FROM orders JOIN customers ON orders.customer_id = customers.id WHERE customers.age > 30 AND orders.amount <= 100");
    }

    #[test]
    fn test_render_single_table() {
        let mut query = Query::cardinality(graph());
        query.add_condition_str("regions", "name = 'EU'").unwrap();
        let sql = render_join_query(query.graph(), &query, "*").unwrap();
        assert_eq!(sql, "SELECT * FROM regions WHERE regions.name = 'EU'");
    }

    #[test]
    fn test_render_rejects_unjoined_tables() {
        let mut query = join_query();
        query.add_table("regions").unwrap();
        let err = render_join_query(query.graph(), &query, "COUNT(*)").unwrap_err();
        assert!(matches!(err, QueryError::UnjoinedTables(tables) if tables == vec!["regions".to_string()]));
    }

    #[tokio::test]
    async fn test_count_with_timeout_passes_rendered_sql() {
        let mut backend = MockGroundTruth::new();
        backend
            .expect_count()
            .withf(|sql| sql.starts_with("SELECT COUNT(*) FROM orders JOIN customers"))
            .times(1)
            .returning(|_| Ok(42));

        let (sql, count) = count_with_timeout(&backend, &join_query(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(count, 42);
        assert!(sql.ends_with("orders.amount <= 100"));
    }

    #[tokio::test]
    async fn test_backend_errors_surface() {
        let mut backend = MockGroundTruth::new();
        backend.expect_count().returning(|_| Err(GroundTruthError::Backend("connection refused".to_string())));
        let err = count_with_timeout(&backend, &join_query(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, GroundTruthError::Backend(_)));
    }

    #[tokio::test]
    async fn test_slow_backend_times_out() {
        let err = count_with_timeout(&Sleepy, &join_query(), Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, GroundTruthError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_count_all_keeps_order() {
        let mut backend = MockGroundTruth::new();
        backend.expect_count().returning(|sql| Ok(if sql.contains("JOIN") { 2 } else { 1 }));

        let mut single = Query::cardinality(graph());
        single.add_table("customers").unwrap();
        let results = count_all(&backend, &[join_query(), single], Duration::from_secs(1)).await;
        let counts: Vec<u64> = results.into_iter().map(|r| r.unwrap().1).collect();
        assert_eq!(counts, vec![2, 1]);
    }
}
