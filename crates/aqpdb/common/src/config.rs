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
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings for the offline table preparation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreparationConfig {
    /// String attributes with more distinct values than this are dropped.
    pub max_unique: usize,
    /// Prepared tables above this row count are persisted as a uniform subset.
    pub max_data: usize,
    /// Offset added to the column mean to build a numeric null sentinel.
    pub null_epsilon: f64,
    /// Seed for the capacity truncation draw.
    pub seed: u64,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            max_unique: 10_000,
            max_data: 20_000_000,
            null_epsilon: 0.0001,
            seed: 1,
        }
    }
}

/// Settings for the join sampling engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub max_table_data: usize,
    pub post_sampling_factor: f64,
    /// Share of every requested sample that is set aside as a disjoint incremental part.
    pub incremental_rate: f64,
    pub seed: u64,
    pub disable_cache: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            max_table_data: 20_000_000,
            post_sampling_factor: 30.0,
            incremental_rate: 0.0,
            seed: 1,
            disable_cache: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub preparation: PreparationConfig,
    pub sampling: SamplingConfig,
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.preparation.max_data == 0 {
            return Err(ConfigError::Invalid("preparation.max_data must be positive".to_string()));
        }
        if self.preparation.null_epsilon <= 0.0 {
            return Err(ConfigError::Invalid("preparation.null_epsilon must be positive".to_string()));
        }
        if self.sampling.post_sampling_factor <= 0.0 {
            return Err(ConfigError::Invalid("sampling.post_sampling_factor must be positive".to_string()));
        }
        if !(0.0..1.0).contains(&self.sampling.incremental_rate) {
            return Err(ConfigError::Invalid(format!("sampling.incremental_rate {} outside [0, 1)", self.sampling.incremental_rate)));
        }
        Ok(())
    }
}
