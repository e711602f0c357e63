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
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::{PreparationError, PreparationResult};

/// Dictionary of a categorical attribute. Code `i + 1` stands for `values[i]`; code 0 is null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalDictionary {
    pub values: Vec<Value>,
}

impl CategoricalDictionary {
    pub fn code_of(&self, value: &Value) -> Option<f64> {
        if value.is_null() {
            return Some(0.0);
        }
        self.values.iter().position(|v| v == value).map(|idx| (idx + 1) as f64)
    }

    pub fn value_of(&self, code: f64) -> Value {
        if code < 1.0 {
            return Value::Null;
        }
        self.values.get(code as usize - 1).cloned().unwrap_or(Value::Null)
    }
}

/// Reconstruction map of one functionally dependent attribute, in first-seen order of the determinant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyMap {
    pub entries: Vec<(Value, Value)>,
}

impl DependencyMap {
    pub fn lookup(&self) -> HashMap<&Value, &Value> {
        self.entries.iter().map(|(determinant, dependent)| (determinant, dependent)).collect()
    }
}

/// Everything the sampling engine needs to know about a prepared table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub table: String,
    /// Rows read from the raw source.
    pub length: u64,
    /// Rows actually persisted; below `length` when the table hit `max_data`.
    pub stored_length: u64,
    pub sample_rate: f64,
    /// Encoded columns in storage order.
    pub columns: Vec<String>,
    pub categoricals: BTreeMap<String, CategoricalDictionary>,
    pub null_values: BTreeMap<String, f64>,
    /// Determinant column -> dependent column -> reconstruction map.
    pub dependencies: BTreeMap<String, BTreeMap<String, DependencyMap>>,
    /// Relationship identifier -> mean projected fan-out of this table's rows.
    pub incoming_means: BTreeMap<String, f64>,
    pub dropped_attributes: Vec<String>,
}

impl TableMetadata {
    pub fn null_value(&self, column: &str) -> Option<f64> {
        self.null_values.get(column).copied()
    }

    pub fn is_truncated(&self) -> bool {
        self.stored_length < self.length
    }

    /// Share of the read rows that made it into storage.
    pub fn stored_fraction(&self) -> f64 {
        if self.length == 0 { 1.0 } else { self.stored_length as f64 / self.length as f64 }
    }

    /// Row count of the table before any pre-sampling of its source data.
    pub fn full_size(&self) -> f64 {
        self.length as f64 / self.sample_rate
    }

    /// Maps an encoded number back to the raw value it stands for.
    pub fn decode(&self, column: &str, encoded: f64) -> Value {
        if let Some(dictionary) = self.categoricals.get(column) {
            return dictionary.value_of(encoded);
        }
        match self.null_value(column) {
            Some(null) if null == encoded => Value::Null,
            _ => Value::Float(encoded),
        }
    }

    /// Encodes a raw value the way the pipeline stored it. `None` for unknown categories.
    pub fn encode(&self, column: &str, value: &Value) -> Option<f64> {
        if let Some(dictionary) = self.categoricals.get(column) {
            return dictionary.code_of(value);
        }
        match value {
            Value::Null => self.null_value(column),
            other => other.as_f64(),
        }
    }

    pub fn determinant_of(&self, dependent: &str) -> Option<(&str, &DependencyMap)> {
        self.dependencies
            .iter()
            .find_map(|(determinant, maps)| maps.get(dependent).map(|map| (determinant.as_str(), map)))
    }
}

/// All-numeric, column-major table as persisted by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncodedTable {
    pub name: String,
    pub columns: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

impl EncodedTable {
    pub fn len(&self) -> usize {
        self.data.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.column_index(name).map(|idx| self.data[idx].as_slice())
    }

    pub fn row(&self, idx: usize) -> Vec<f64> {
        self.data.iter().map(|column| column[idx]).collect()
    }

    pub fn drop_columns(&mut self, names: &[String]) {
        let keep: Vec<bool> = self.columns.iter().map(|c| !names.contains(c)).collect();
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
        let mut flags = keep.iter();
        self.data.retain(|_| *flags.next().unwrap_or(&true));
    }

    /// Keeps only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> EncodedTable {
        EncodedTable {
            name: self.name.clone(),
            columns: self.columns.clone(),
            data: self.data.iter().map(|column| rows.iter().map(|&r| column[r]).collect()).collect(),
        }
    }
}

/// An encoded table together with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTable {
    pub table: EncodedTable,
    pub metadata: TableMetadata,
}

impl PreparedTable {
    /// Raw values of an encoded column.
    pub fn decode_column(&self, column: &str) -> PreparationResult<Vec<Value>> {
        let values = self.table.column(column).ok_or_else(|| PreparationError::ColumnNotFound {
            table: self.table.name.clone(),
            column: column.to_string(),
        })?;
        Ok(values.iter().map(|&v| self.metadata.decode(column, v)).collect())
    }

    /// Rebuilds a column removed by functional-dependency compression from its determinant. A
    /// determinant that was compressed itself is rebuilt first.
    pub fn reconstruct(&self, dependent: &str) -> PreparationResult<Vec<Value>> {
        let (determinant, map) = self.metadata.determinant_of(dependent).ok_or_else(|| PreparationError::ColumnNotFound {
            table: self.table.name.clone(),
            column: dependent.to_string(),
        })?;
        let lookup = map.lookup();
        let determinants = match self.table.column_index(determinant) {
            Some(_) => self.decode_column(determinant)?,
            None => self.reconstruct(determinant)?,
        };
        Ok(determinants.iter().map(|value| lookup.get(value).map_or(Value::Null, |&dependent| dependent.clone())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> TableMetadata {
        let mut metadata = TableMetadata {
            table: "customers".to_string(),
            length: 4,
            stored_length: 2,
            sample_rate: 0.5,
            ..Default::default()
        };
        metadata.categoricals.insert(
            "customers.region".to_string(),
            CategoricalDictionary {
                values: vec!["EU".into(), "ASIA".into()],
            },
        );
        metadata.null_values.insert("customers.region".to_string(), 0.0);
        metadata.null_values.insert("customers.age".to_string(), 40.0001);
        metadata
    }

    #[test]
    fn test_decode_and_encode() {
        let metadata = metadata();
        assert_eq!(metadata.decode("customers.region", 2.0), Value::Text("ASIA".to_string()));
        assert_eq!(metadata.decode("customers.region", 0.0), Value::Null);
        assert_eq!(metadata.decode("customers.age", 40.0001), Value::Null);
        assert_eq!(metadata.decode("customers.age", 33.0), Value::Float(33.0));

        assert_eq!(metadata.encode("customers.region", &"EU".into()), Some(1.0));
        assert_eq!(metadata.encode("customers.region", &"AFRICA".into()), None);
        assert_eq!(metadata.encode("customers.age", &Value::Null), Some(40.0001));
    }

    #[test]
    fn test_size_accounting() {
        let metadata = metadata();
        assert!(metadata.is_truncated());
        assert_eq!(metadata.stored_fraction(), 0.5);
        assert_eq!(metadata.full_size(), 8.0);
    }

    #[test]
    fn test_encoded_table_selection() {
        let mut table = EncodedTable {
            name: "t".to_string(),
            columns: vec!["t.a".to_string(), "t.b".to_string()],
            data: vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        };
        let selected = table.select_rows(&[2, 0]);
        assert_eq!(selected.data, vec![vec![3.0, 1.0], vec![6.0, 4.0]]);
        assert_eq!(table.row(1), vec![2.0, 5.0]);

        table.drop_columns(&["t.a".to_string()]);
        assert_eq!(table.columns, vec!["t.b"]);
        assert_eq!(table.column("t.b"), Some(&[4.0, 5.0, 6.0][..]));
    }
}
