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

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use tracing::info;

use super::{JoinSample, JoinSampler, SampleRequest, SamplingResult};
use crate::schema::SchemaGraph;

/// Output of one sampling job.
#[derive(Debug, Clone)]
pub struct SampleJob {
    pub request: SampleRequest,
    pub primary: JoinSample,
    pub incremental: Option<JoinSample>,
}

/// One request per table of the schema.
pub fn single_table_requests(graph: &SchemaGraph, sample_size: usize) -> Vec<SampleRequest> {
    graph.tables().iter().map(|table| SampleRequest::single_table(table.name.clone(), sample_size)).collect()
}

/// One request per relationship of the schema, each joining the two tables it connects.
pub fn relationship_requests(graph: &SchemaGraph, sample_size: usize) -> Vec<SampleRequest> {
    graph
        .relationships()
        .iter()
        .map(|relationship| SampleRequest::relationships(vec![relationship.identifier.clone()], sample_size))
        .collect()
}

/// Runs all requests in parallel. Job `i` draws from an RNG seeded with `seed + i`,
/// so results do not depend on scheduling.
///
/// An incremental part is split off when the sampler is configured with a non-zero incremental rate.
pub fn run_requests(sampler: &JoinSampler, requests: &[SampleRequest]) -> Vec<SamplingResult<SampleJob>> {
    let config = sampler.config();
    info!("Running {} sampling jobs", requests.len());
    requests
        .par_iter()
        .enumerate()
        .map(|(idx, request)| {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(idx as u64));
            if config.incremental_rate > 0.0 {
                let (primary, incremental) = sampler.generate_samples_with_incremental(request, config.incremental_rate, &mut rng)?;
                Ok(SampleJob {
                    request: request.clone(),
                    primary,
                    incremental: Some(incremental),
                })
            } else {
                Ok(SampleJob {
                    request: request.clone(),
                    primary: sampler.generate_samples(request, &mut rng)?,
                    incremental: None,
                })
            }
        })
        .collect()
}
