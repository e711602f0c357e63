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

use aqpdb_common::{SamplingConfig, Value, qualify};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

use super::{SamplingError, SamplingResult, TableCache, effective_rate, probability_round};
use crate::prep::{EncodedTable, TableMetadata};
use crate::schema::{JoinDirection, JoinPath, SchemaGraph, assemble_join_path};
use crate::storage::PreparedStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SampleTarget {
    SingleTable(String),
    /// Join along these relationship identifiers, in any order that chains.
    Relationships(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub target: SampleTarget,
    pub sample_size: usize,
    /// Overrides the configured post-sampling factor.
    pub post_sampling_factor: Option<f64>,
}

impl SampleRequest {
    pub fn single_table(table: impl Into<String>, sample_size: usize) -> Self {
        Self {
            target: SampleTarget::SingleTable(table.into()),
            sample_size,
            post_sampling_factor: None,
        }
    }

    pub fn relationships(relationship_ids: Vec<String>, sample_size: usize) -> Self {
        Self {
            target: SampleTarget::Relationships(relationship_ids),
            sample_size,
            post_sampling_factor: None,
        }
    }

    pub fn with_post_sampling_factor(mut self, factor: f64) -> Self {
        self.post_sampling_factor = Some(factor);
        self
    }

    pub fn label(&self) -> String {
        match &self.target {
            SampleTarget::SingleTable(table) => table.clone(),
            SampleTarget::Relationships(ids) => ids.join(" AND "),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSizeEstimate {
    pub start_table: String,
    /// Rows the join is expected to yield from the prepared data.
    pub sample_rows: f64,
    /// Approximate size of the unsampled join: the start table's projected row count.
    pub full_join_size: f64,
}

/// A sample of a single table or of a join, row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSample {
    pub tables: Vec<String>,
    pub relationships: Vec<String>,
    pub columns: Vec<String>,
    /// Null sentinel per column; `None` for null-indicator columns.
    pub null_values: Vec<Option<f64>>,
    pub rows: Vec<Vec<f64>>,
    /// Source row of every participating table per sampled row, `None` where the table is missing.
    pub row_keys: Vec<Vec<Option<usize>>>,
    pub full_join_size: f64,
}

impl JoinSample {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }
}

/// Columns one table contributes to a sample.
struct TableBlock<'a> {
    name: String,
    data: Arc<EncodedTable>,
    metadata: &'a TableMetadata,
    kept: Vec<usize>,
    /// Multiplier column index and the name of its defined variant.
    multipliers: Vec<(usize, String)>,
    indicator: Option<String>,
}

impl TableBlock<'_> {
    fn null_of(&self, column: usize) -> f64 {
        self.metadata.null_value(&self.data.columns[column]).unwrap_or(0.0)
    }

    fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self.kept.iter().map(|&c| self.data.columns[c].clone()).collect();
        columns.extend(self.multipliers.iter().map(|(_, name)| name.clone()));
        columns.extend(self.indicator.iter().cloned());
        columns
    }

    fn null_values(&self) -> Vec<Option<f64>> {
        let mut nulls: Vec<Option<f64>> = self.kept.iter().map(|&c| self.metadata.null_value(&self.data.columns[c])).collect();
        nulls.extend(self.multipliers.iter().map(|&(c, _)| self.metadata.null_value(&self.data.columns[c])));
        nulls.extend(self.indicator.iter().map(|_| None));
        nulls
    }

    fn extend_row(&self, out: &mut Vec<f64>, row: Option<usize>) {
        match row {
            Some(r) => {
                out.extend(self.kept.iter().map(|&c| self.data.data[c][r]));
                out.extend(self.multipliers.iter().map(|&(c, _)| {
                    let multiplier = self.data.data[c][r];
                    if multiplier == 0.0 { 1.0 } else { multiplier }
                }));
                if self.indicator.is_some() {
                    out.push(0.0);
                }
            }
            None => {
                out.extend(self.kept.iter().map(|&c| self.null_of(c)));
                out.extend(self.multipliers.iter().map(|&(c, _)| self.null_of(c)));
                if self.indicator.is_some() {
                    out.push(1.0);
                }
            }
        }
    }

    fn decoded_keys(&self, attribute: &str) -> SamplingResult<Vec<Value>> {
        let column = qualify(&self.name, attribute);
        let values = self.data.column(&column).ok_or_else(|| SamplingError::MissingKeyColumn {
            table: self.name.clone(),
            column: column.clone(),
        })?;
        Ok(values.iter().map(|&v| self.metadata.decode(&column, v)).collect())
    }
}

/// Draws bounded, representative samples of tables and joins from prepared data.
#[derive(Debug)]
pub struct JoinSampler {
    graph: Arc<SchemaGraph>,
    store: PreparedStore,
    metadata: BTreeMap<String, TableMetadata>,
    cache: TableCache,
    config: SamplingConfig,
}

impl JoinSampler {
    pub fn new(graph: Arc<SchemaGraph>, store: PreparedStore, metadata: BTreeMap<String, TableMetadata>, config: SamplingConfig) -> Self {
        let cache = if config.disable_cache { TableCache::disabled() } else { TableCache::new() };
        Self {
            graph,
            store,
            metadata,
            cache,
            config,
        }
    }

    /// Opens a sampler over a store written by the preparation pipeline.
    pub fn open(graph: Arc<SchemaGraph>, store: PreparedStore, config: SamplingConfig) -> SamplingResult<Self> {
        let metadata = store.load_metadata()?;
        Ok(Self::new(graph, store, metadata, config))
    }

    pub fn graph(&self) -> &SchemaGraph {
        &self.graph
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn cache(&self) -> &TableCache {
        &self.cache
    }

    pub fn table_metadata(&self, table: &str) -> SamplingResult<&TableMetadata> {
        self.metadata.get(table).ok_or_else(|| SamplingError::MissingMetadata(table.to_string()))
    }

    fn load(&self, table: &str) -> SamplingResult<Arc<EncodedTable>> {
        Ok(self.cache.get_or_load(table, || self.store.load_table(table))?)
    }

    fn available_rows(&self, table: &str) -> SamplingResult<f64> {
        let metadata = self.table_metadata(table)?;
        Ok((metadata.stored_length as f64).min(self.config.max_table_data as f64))
    }

    /// Picks the table a join sample starts from.
    ///
    /// A table that is itself sampled wins; otherwise the table most relationships point at.
    pub fn find_start_table(&self, relationship_ids: &[String]) -> SamplingResult<String> {
        let tables = self.graph.tables_of(relationship_ids)?;
        if tables.is_empty() {
            return Err(SamplingError::EmptyRequest);
        }
        for name in &tables {
            if self.graph.table(name)?.sample_rate < 1.0 {
                return Ok(name.clone());
            }
        }

        let mut fan_in: HashMap<&str, usize> = HashMap::new();
        for id in relationship_ids {
            *fan_in.entry(self.graph.relationship(id)?.target.as_str()).or_default() += 1;
        }
        let mut best = &tables[0];
        for name in &tables {
            if fan_in.get(name.as_str()).copied().unwrap_or(0) > fan_in.get(best.as_str()).copied().unwrap_or(0) {
                best = name;
            }
        }
        Ok(best.clone())
    }

    fn prepare(&self, target: &SampleTarget) -> SamplingResult<(JoinPath, JoinSizeEstimate)> {
        match target {
            SampleTarget::SingleTable(table) => {
                self.graph.table(table)?;
                let metadata = self.table_metadata(table)?;
                let path = JoinPath {
                    start: table.clone(),
                    steps: Vec::new(),
                };
                let estimate = JoinSizeEstimate {
                    start_table: table.clone(),
                    sample_rows: self.available_rows(table)?,
                    full_join_size: metadata.full_size(),
                };
                Ok((path, estimate))
            }
            SampleTarget::Relationships(ids) => {
                let start = self.find_start_table(ids)?;
                let path = assemble_join_path(&self.graph, &start, ids)?;

                let mut sample_rows = self.available_rows(&start)?;
                for step in path.steps.iter().filter(|s| s.direction == JoinDirection::FanOut) {
                    let relationship = self.graph.relationship(&step.relationship)?;
                    let referencing = self.graph.table(&relationship.source)?;
                    let referencing_metadata = self.table_metadata(&referencing.name)?;
                    let mean = self.table_metadata(&relationship.target)?.incoming_means.get(&relationship.identifier).copied().unwrap_or(1.0);
                    sample_rows *= (mean * referencing.sample_rate * referencing_metadata.stored_fraction()).max(1.0);
                }

                let estimate = JoinSizeEstimate {
                    full_join_size: self.table_metadata(&start)?.full_size(),
                    start_table: start,
                    sample_rows,
                };
                Ok((path, estimate))
            }
        }
    }

    pub fn estimate_join_size(&self, target: &SampleTarget) -> SamplingResult<JoinSizeEstimate> {
        Ok(self.prepare(target)?.1)
    }

    fn blocks(&self, path: &JoinPath) -> SamplingResult<Vec<TableBlock<'_>>> {
        let joined = !path.steps.is_empty();
        path.tables()
            .into_iter()
            .map(|name| {
                let table = self.graph.table(name)?;
                let data = self.load(name)?;
                let irrelevant: Vec<String> = table.irrelevant_attributes.iter().map(|a| qualify(name, a)).collect();
                let kept: Vec<usize> = (0..data.columns.len()).filter(|&c| !irrelevant.contains(&data.columns[c])).collect();
                let mut multipliers = Vec::new();
                for relationship in self.graph.incoming_relationships(name)? {
                    if let Some(idx) = data.column_index(&relationship.multiplier_column()) {
                        if kept.contains(&idx) {
                            multipliers.push((idx, relationship.multiplier_nn_column()));
                        }
                    }
                }
                Ok(TableBlock {
                    name: name.to_string(),
                    metadata: self.table_metadata(name)?,
                    indicator: joined.then(|| table.qualified_null_indicator()),
                    data,
                    kept,
                    multipliers,
                })
            })
            .collect()
    }

    fn draw_start_rows<R: Rng>(&self, table: &str, rate: f64, rng: &mut R) -> SamplingResult<Vec<usize>> {
        let rows = self.table_metadata(table)?.stored_length as usize;
        if rows == 0 {
            return Ok(Vec::new());
        }
        let rate = rate.min(self.config.max_table_data as f64 / rows as f64);
        let quota = (probability_round(rows as f64 * rate, rng) as usize).min(rows);
        if quota == rows {
            return Ok((0..rows).collect());
        }
        let mut picked = rand::seq::index::sample(rng, rows, quota).into_vec();
        picked.sort_unstable();
        Ok(picked)
    }

    fn expand<R: Rng>(&self, path: &JoinPath, blocks: &[TableBlock<'_>], start_rows: Vec<usize>, sample_size: usize, full_join_size: f64, rng: &mut R) -> SamplingResult<JoinSample> {
        let positions: HashMap<&str, usize> = blocks.iter().enumerate().map(|(pos, block)| (block.name.as_str(), pos)).collect();
        let mut tuples: Vec<Vec<Option<usize>>> = start_rows.into_iter().map(|row| vec![Some(row)]).collect();

        for step in &path.steps {
            let relationship = self.graph.relationship(&step.relationship)?;
            let source_pos = positions[relationship.source.as_str()];
            let target_pos = positions[relationship.target.as_str()];
            let source_keys = blocks[source_pos].decoded_keys(&relationship.source_attribute)?;
            let target_keys = blocks[target_pos].decoded_keys(&relationship.target_attribute)?;

            let (joined_pos, joined_keys, new_keys) = match step.direction {
                JoinDirection::Cycle => {
                    tuples.retain(|tuple| match (tuple[source_pos], tuple[target_pos]) {
                        (Some(s), Some(t)) => !source_keys[s].is_null() && source_keys[s] == target_keys[t],
                        _ => true,
                    });
                    continue;
                }
                JoinDirection::FanOut => (target_pos, &target_keys, &source_keys),
                JoinDirection::Lookup => (source_pos, &source_keys, &target_keys),
            };

            let mut index: HashMap<&Value, Vec<usize>> = HashMap::new();
            for (row, key) in new_keys.iter().enumerate().filter(|(_, k)| !k.is_null()) {
                index.entry(key).or_default().push(row);
            }

            let mut expanded = Vec::with_capacity(tuples.len());
            for mut tuple in tuples {
                match tuple[joined_pos].and_then(|row| index.get(&joined_keys[row])) {
                    Some(matches) => {
                        for &row in matches {
                            let mut extended = tuple.clone();
                            extended.push(Some(row));
                            expanded.push(extended);
                        }
                    }
                    None => {
                        tuple.push(None);
                        expanded.push(tuple);
                    }
                }
            }
            debug!("Joined {} into {} rows", step.relationship, expanded.len());
            tuples = expanded;
        }

        if tuples.len() > sample_size {
            let mut keep = vec![false; tuples.len()];
            for idx in rand::seq::index::sample(rng, tuples.len(), sample_size).into_vec() {
                keep[idx] = true;
            }
            tuples = tuples.into_iter().zip(keep).filter_map(|(tuple, keep)| keep.then_some(tuple)).collect();
        }

        let mut columns = Vec::new();
        let mut null_values = Vec::new();
        for block in blocks {
            columns.extend(block.columns());
            null_values.extend(block.null_values());
        }
        let rows = tuples
            .iter()
            .map(|tuple| {
                let mut row = Vec::with_capacity(columns.len());
                for (block, source_row) in blocks.iter().zip(tuple) {
                    block.extend_row(&mut row, *source_row);
                }
                row
            })
            .collect();

        Ok(JoinSample {
            tables: blocks.iter().map(|b| b.name.clone()).collect(),
            relationships: path.steps.iter().map(|s| s.relationship.clone()).collect(),
            columns,
            null_values,
            rows,
            row_keys: tuples,
            full_join_size,
        })
    }

    /// Produces at most `request.sample_size` rows of the requested table or join.
    pub fn generate_samples<R: Rng>(&self, request: &SampleRequest, rng: &mut R) -> SamplingResult<JoinSample> {
        let (path, estimate) = self.prepare(&request.target)?;
        let factor = request.post_sampling_factor.unwrap_or(self.config.post_sampling_factor);
        let rate = effective_rate(request.sample_size, estimate.sample_rows, factor);
        debug!("Sampling {} from {} at rate {} (estimated {} rows)", request.label(), estimate.start_table, rate, estimate.sample_rows);

        let start_rows = self.draw_start_rows(&path.start, rate, rng)?;
        let blocks = self.blocks(&path)?;
        let sample = self.expand(&path, &blocks, start_rows, request.sample_size, estimate.full_join_size, rng)?;
        info!("Requested {} samples for {} and got {}", request.sample_size, request.label(), sample.len());
        Ok(sample)
    }

    /// Like [`generate_samples`](Self::generate_samples), using an RNG seeded from the configuration.
    pub fn generate(&self, request: &SampleRequest) -> SamplingResult<JoinSample> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        self.generate_samples(request, &mut rng)
    }

    /// Produces a primary sample plus a disjoint incremental part holding roughly
    /// `incremental_rate` of the requested rows.
    ///
    /// Start rows are split before the join is expanded, so no joined row appears in both parts.
    pub fn generate_samples_with_incremental<R: Rng>(&self, request: &SampleRequest, incremental_rate: f64, rng: &mut R) -> SamplingResult<(JoinSample, JoinSample)> {
        if !(incremental_rate > 0.0 && incremental_rate < 1.0) {
            return Err(SamplingError::InvalidIncrementalRate(incremental_rate));
        }
        let (path, estimate) = self.prepare(&request.target)?;
        let factor = request.post_sampling_factor.unwrap_or(self.config.post_sampling_factor);
        let rate = effective_rate(request.sample_size, estimate.sample_rows, factor);

        let mut start_rows = self.draw_start_rows(&path.start, rate, rng)?;
        start_rows.shuffle(rng);
        let incremental_count = (probability_round(start_rows.len() as f64 * incremental_rate, rng) as usize).min(start_rows.len());
        let mut incremental_rows = start_rows.split_off(start_rows.len() - incremental_count);
        start_rows.sort_unstable();
        incremental_rows.sort_unstable();

        let incremental_size = (probability_round(request.sample_size as f64 * incremental_rate, rng) as usize).min(request.sample_size);
        let primary_size = request.sample_size - incremental_size;

        let blocks = self.blocks(&path)?;
        let primary = self.expand(&path, &blocks, start_rows, primary_size, estimate.full_join_size, rng)?;
        let incremental = self.expand(&path, &blocks, incremental_rows, incremental_size, estimate.full_join_size, rng)?;
        info!(
            "Requested {} samples for {} and got {} + {} (incremental)",
            request.sample_size,
            request.label(),
            primary.len(),
            incremental.len()
        );
        Ok((primary, incremental))
    }
}
