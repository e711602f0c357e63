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
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{PreparationError, PreparationResult};

/// Row-oriented raw data of one table, with unqualified column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawTable {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> PreparationResult<()> {
        if row.len() != self.columns.len() {
            return Err(PreparationError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn with_rows(mut self, rows: impl IntoIterator<Item = Vec<Value>>) -> PreparationResult<Self> {
        for row in rows {
            self.push_row(row)?;
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }
}

/// Where the preparation pipeline reads raw tables from.
///
/// Implementations are shared across preparation jobs running in parallel.
pub trait RawTableSource: Send + Sync {
    fn load(&self, table: &str) -> PreparationResult<RawTable>;
}

/// Raw tables held in memory, keyed by table name.
#[derive(Debug, Default)]
pub struct InMemorySource {
    tables: RwLock<HashMap<String, RawTable>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: impl Into<String>, data: RawTable) {
        self.tables.write().insert(table.into(), data);
    }

    pub fn with_table(self, table: impl Into<String>, data: RawTable) -> Self {
        self.insert(table, data);
        self
    }
}

impl RawTableSource for InMemorySource {
    fn load(&self, table: &str) -> PreparationResult<RawTable> {
        self.tables.read().get(table).cloned().ok_or_else(|| PreparationError::MissingTable(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_width_checked() {
        let mut table = RawTable::new(&["id", "region"]);
        table.push_row(vec![Value::Int(1), "EU".into()]).unwrap();
        let result = table.push_row(vec![Value::Int(2)]);

        assert!(matches!(result, Err(PreparationError::RowWidth { expected: 2, found: 1 })));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_in_memory_source() {
        let source = InMemorySource::new().with_table("customers", RawTable::new(&["id"]));
        assert!(source.load("customers").unwrap().is_empty());
        assert!(matches!(source.load("orders"), Err(PreparationError::MissingTable(_))));
    }

    #[test]
    fn test_column_values() {
        let table = RawTable::new(&["id", "region"])
            .with_rows(vec![vec![Value::Int(1), "EU".into()], vec![Value::Int(2), Value::Null]])
            .unwrap();
        let regions: Vec<&Value> = table.column_values("region").unwrap().collect();
        assert_eq!(regions, vec![&Value::Text("EU".to_string()), &Value::Null]);
        assert!(table.column_values("missing").is_none());
    }
}
