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

use aqpdb_common::{PreparationConfig, Value, qualify};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

use super::{CategoricalDictionary, DependencyMap, EncodedTable, PreparationError, PreparationResult, PreparedTable, RawTableSource, TableMetadata};
use crate::schema::{SchemaGraph, Table};
use crate::storage::PreparedStore;

/// Column-major working copy of a table while it moves through the pipeline.
struct Frame {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
    rows: usize,
}

impl Frame {
    fn index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    fn remove(&mut self, column: &str) {
        if let Some(idx) = self.index(column) {
            self.columns.remove(idx);
            self.data.remove(idx);
        }
    }
}

/// Prepares a single table: column scoping, functional-dependency compression, multipliers,
/// categorical and null encoding, and the `max_data` cap.
pub fn prepare_table(graph: &SchemaGraph, table_name: &str, source: &dyn RawTableSource, config: &PreparationConfig) -> PreparationResult<PreparedTable> {
    let table = graph.table(table_name)?;
    let mut metadata = TableMetadata {
        table: table.name.clone(),
        sample_rate: table.sample_rate,
        ..Default::default()
    };

    let mut frame = scope_columns(table, source)?;
    metadata.length = frame.rows as u64;

    info!("Processing functional dependencies for {}", table.name);
    compress_dependencies(table, &mut frame, &mut metadata, config)?;

    info!("Adding multipliers for {}", table.name);
    add_multipliers(graph, table, source, &mut frame, &mut metadata)?;

    info!("Processing categorical and null values for {}", table.name);
    let mut encoded = encode_columns(table, frame, &mut metadata, config)?;
    info!("Final attributes for {} are {:?}", table.name, encoded.columns);

    if encoded.len() > config.max_data {
        warn!("Table {} has {} rows, persisting a uniform subset of {}", table.name, encoded.len(), config.max_data);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut rows = rand::seq::index::sample(&mut rng, encoded.len(), config.max_data).into_vec();
        rows.sort_unstable();
        encoded = encoded.select_rows(&rows);
    }
    metadata.stored_length = encoded.len() as u64;
    metadata.columns = encoded.columns.clone();

    Ok(PreparedTable { table: encoded, metadata })
}

/// Prepares every table of the graph in parallel and persists tables and metadata into `store`.
pub fn prepare_all_tables(graph: &SchemaGraph, source: &dyn RawTableSource, store: &PreparedStore, config: &PreparationConfig) -> PreparationResult<BTreeMap<String, TableMetadata>> {
    let prepared: Vec<PreparedTable> = graph
        .tables()
        .par_iter()
        .map(|table| {
            info!("Preparing {}", table.name);
            prepare_table(graph, &table.name, source, config)
        })
        .collect::<PreparationResult<_>>()?;

    let mut all_metadata = BTreeMap::new();
    for prepared in prepared {
        store.save_table(&prepared.table)?;
        all_metadata.insert(prepared.metadata.table.clone(), prepared.metadata);
    }
    store.save_metadata(&all_metadata)?;
    info!("Prepared {} tables into {}", all_metadata.len(), store.root().display());

    Ok(all_metadata)
}

fn scope_columns(table: &Table, source: &dyn RawTableSource) -> PreparationResult<Frame> {
    let raw = source.load(&table.name)?;
    for attribute in &table.attributes {
        if raw.column_index(attribute).is_none() {
            return Err(PreparationError::ColumnNotFound {
                table: table.name.clone(),
                column: attribute.clone(),
            });
        }
    }

    let mut frame = Frame {
        columns: Vec::new(),
        data: Vec::new(),
        rows: raw.len(),
    };
    for (idx, column) in raw.columns.iter().enumerate() {
        if table.ignored_attributes.contains(column) {
            continue;
        }
        frame.columns.push(qualify(&table.name, column));
        frame.data.push(raw.rows.iter().map(|row| row[idx].clone()).collect());
    }
    Ok(frame)
}

/// Why a column cannot be encoded and has to be dropped, if it cannot.
fn drop_reason(values: &[Value], max_unique: usize) -> Option<String> {
    if values.iter().all(Value::is_null) {
        return Some("no values present".to_string());
    }
    if values.iter().any(Value::is_text) {
        let distinct = values.iter().filter(|v| !v.is_null()).collect::<HashSet<_>>().len();
        if distinct > max_unique {
            return Some(format!("{distinct} distinct values exceed {max_unique}"));
        }
    }
    None
}

fn compress_dependencies(table: &Table, frame: &mut Frame, metadata: &mut TableMetadata, config: &PreparationConfig) -> PreparationResult<()> {
    // dependent -> the determinant it was compressed through
    let mut compressed_via: HashMap<String, String> = HashMap::new();

    for determinant in frame.columns.clone() {
        let Some(det_idx) = frame.index(&determinant) else { continue };
        if drop_reason(&frame.data[det_idx], config.max_unique).is_some() {
            debug!("Not compressing through {}: it will be dropped", determinant);
            continue;
        }

        for dependent in table.dependents_of(&determinant) {
            let plain = dependent.strip_prefix(&format!("{}.", table.name)).unwrap_or(dependent).to_string();
            if table.no_compress.contains(&plain) || compressed_via.contains_key(dependent) {
                continue;
            }
            // Chains resolve through removed determinants; a loop back to the dependent would lose both.
            let mut ancestor = compressed_via.get(&determinant);
            let mut cyclic = false;
            while let Some(column) = ancestor {
                if column == dependent {
                    cyclic = true;
                    break;
                }
                ancestor = compressed_via.get(column);
            }
            if cyclic {
                continue;
            }
            let Some(dep_idx) = frame.index(dependent) else { continue };

            let mut positions: HashMap<&Value, usize> = HashMap::new();
            let mut map = DependencyMap::default();
            for (det_value, dep_value) in frame.data[det_idx].iter().zip(&frame.data[dep_idx]) {
                match positions.get(det_value) {
                    Some(&pos) if &map.entries[pos].1 != dep_value => {
                        return Err(PreparationError::FunctionalDependencyViolation {
                            table: table.name.clone(),
                            determinant: determinant.clone(),
                            dependent: dependent.to_string(),
                            value: det_value.to_string(),
                            existing: map.entries[pos].1.to_string(),
                            conflicting: dep_value.to_string(),
                        });
                    }
                    Some(_) => {}
                    None => {
                        positions.insert(det_value, map.entries.len());
                        map.entries.push((det_value.clone(), dep_value.clone()));
                    }
                }
            }

            debug!("Compressing {} via {} ({} distinct determinants)", dependent, determinant, map.entries.len());
            metadata.dependencies.entry(determinant.clone()).or_default().insert(dependent.to_string(), map);
            compressed_via.insert(dependent.to_string(), determinant.clone());
        }
    }

    for column in compressed_via.keys() {
        frame.remove(column);
    }
    Ok(())
}

fn add_multipliers(graph: &SchemaGraph, table: &Table, source: &dyn RawTableSource, frame: &mut Frame, metadata: &mut TableMetadata) -> PreparationResult<()> {
    for relationship in graph.incoming_relationships(&table.name)? {
        debug!("Adding multiplier for {} in {}", relationship.identifier, table.name);

        let primary_key = table.single_primary_key().ok_or_else(|| PreparationError::UnsupportedRelationship {
            relationship: relationship.identifier.clone(),
            reason: "only single primary keys are supported".to_string(),
        })?;
        if relationship.target_attribute != primary_key {
            return Err(PreparationError::UnsupportedRelationship {
                relationship: relationship.identifier.clone(),
                reason: "only primary key references are supported".to_string(),
            });
        }
        let key_column = qualify(&table.name, primary_key);
        let key_idx = frame.index(&key_column).ok_or_else(|| PreparationError::ColumnNotFound {
            table: table.name.clone(),
            column: key_column.clone(),
        })?;

        let referencing = graph.table(&relationship.source)?;
        let neighbor = source.load(&referencing.name)?;
        let references = neighbor.column_values(&relationship.source_attribute).ok_or_else(|| PreparationError::ColumnNotFound {
            table: referencing.name.clone(),
            column: relationship.source_attribute.clone(),
        })?;
        let mut counts: HashMap<&Value, u64> = HashMap::new();
        for value in references.filter(|v| !v.is_null()) {
            *counts.entry(value).or_default() += 1;
        }

        let multipliers: Vec<Value> = frame.data[key_idx]
            .iter()
            .map(|key| Value::Float(counts.get(key).copied().unwrap_or(0) as f64 / referencing.sample_rate))
            .collect();
        let mean = if multipliers.is_empty() {
            0.0
        } else {
            multipliers.iter().filter_map(Value::as_f64).sum::<f64>() / multipliers.len() as f64
        };

        metadata.incoming_means.insert(relationship.identifier.clone(), mean);
        frame.columns.push(relationship.multiplier_column());
        frame.data.push(multipliers);
    }
    Ok(())
}

fn encode_columns(table: &Table, frame: Frame, metadata: &mut TableMetadata, config: &PreparationConfig) -> PreparationResult<EncodedTable> {
    let mut encoded = EncodedTable {
        name: table.name.clone(),
        ..Default::default()
    };

    for (column, values) in frame.columns.into_iter().zip(frame.data) {
        if let Some(reason) = drop_reason(&values, config.max_unique) {
            warn!("Dropping {}: {}", column, reason);
            metadata.dropped_attributes.push(column);
            continue;
        }

        if values.iter().any(Value::is_text) {
            let mut codes: HashMap<&Value, f64> = HashMap::new();
            let mut dictionary = CategoricalDictionary::default();
            for value in values.iter().filter(|v| !v.is_null()) {
                if !codes.contains_key(value) {
                    dictionary.values.push(value.clone());
                    codes.insert(value, dictionary.values.len() as f64);
                }
            }
            let column_codes = values.iter().map(|v| codes.get(v).copied().unwrap_or(0.0)).collect();
            metadata.categoricals.insert(column.clone(), dictionary);
            metadata.null_values.insert(column.clone(), 0.0);
            encoded.columns.push(column);
            encoded.data.push(column_codes);
        } else {
            let present: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if present.iter().any(|v| !v.is_finite()) {
                return Err(PreparationError::NonFiniteValue {
                    table: table.name.clone(),
                    attribute: column,
                });
            }
            let sentinel = null_sentinel(table, &column, &present, values.iter().any(Value::is_null), config.null_epsilon)?;
            let column_values = values.iter().map(|v| v.as_f64().unwrap_or(sentinel)).collect();
            metadata.null_values.insert(column.clone(), sentinel);
            encoded.columns.push(column);
            encoded.data.push(column_values);
        }
    }
    Ok(encoded)
}

/// `mean + epsilon`, with the epsilon widened to stay distinguishable from the mean at large
/// magnitudes.
///
/// Columns that actually hold nulls must not contain the sentinel. Null-free columns only need
/// one for missing join partners, so a colliding candidate is moved further up instead.
fn null_sentinel(table: &Table, column: &str, present: &[f64], has_nulls: bool, null_epsilon: f64) -> PreparationResult<f64> {
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    let mut step = null_epsilon.max(mean.abs() * f64::EPSILON * 4.0);
    let mut sentinel = mean + step;
    let collides = |candidate: f64| present.contains(&candidate);
    let non_finite = || PreparationError::NonFiniteValue {
        table: table.name.clone(),
        attribute: column.to_string(),
    };
    if !sentinel.is_finite() {
        return Err(non_finite());
    }

    if has_nulls {
        if collides(sentinel) {
            return Err(PreparationError::NullSentinelCollision {
                table: table.name.clone(),
                attribute: column.to_string(),
                sentinel,
            });
        }
        return Ok(sentinel);
    }

    while sentinel.is_finite() && collides(sentinel) {
        step *= 2.0;
        sentinel = mean + step;
    }
    if !sentinel.is_finite() {
        return Err(non_finite());
    }
    Ok(sentinel)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::prep::{InMemorySource, RawTable};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_dependency_compression_round_trips(
            labels in prop::collection::vec("[a-z]{1,6}", 1..6),
            keys in prop::collection::vec(0usize..6, 1..60),
        ) {
            let mut graph = SchemaGraph::new();
            graph.add_table(Table::new("t").with_attributes(&["id", "code", "label"]).with_dependency("code", "label")).unwrap();

            let rows: Vec<Vec<Value>> = keys
                .iter()
                .enumerate()
                .map(|(i, &k)| {
                    let label = labels.get(k).map_or(Value::Null, |l| Value::Text(l.clone()));
                    vec![Value::Int(i as i64), Value::Int(k as i64), label]
                })
                .collect();
            let original: Vec<Value> = rows.iter().map(|r| r[2].clone()).collect();
            let source = InMemorySource::new().with_table("t", RawTable::new(&["id", "code", "label"]).with_rows(rows).unwrap());

            let prepared = prepare_table(&graph, "t", &source, &PreparationConfig::default()).unwrap();
            prop_assert!(prepared.table.column("t.label").is_none());
            prop_assert_eq!(prepared.reconstruct("t.label").unwrap(), original);
        }
    }
}
