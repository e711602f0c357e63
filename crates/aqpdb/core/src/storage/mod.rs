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

//! Persistence of prepared tables.
//!
//! One bincode file per encoded table (`<table>.bin`) and a single JSON document holding the
//! metadata of all tables (`metadata.json`). Written once by preparation, read many times by sampling.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::prep::{EncodedTable, TableMetadata};

const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Encoding error: {0}")]
    Encode(String),
    #[error("Decoding error: {0}")]
    Decode(String),
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("No prepared data for table {0}")]
    MissingTable(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Directory holding the output of the preparation pipeline.
#[derive(Debug, Clone)]
pub struct PreparedStore {
    root: PathBuf,
}

impl PreparedStore {
    pub fn open(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(io_error(&root))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.bin"))
    }

    pub fn save_table(&self, table: &EncodedTable) -> StorageResult<()> {
        let path = self.table_path(&table.name);
        write_binary(&path, table)?;
        debug!("Stored {} rows of {} at {}", table.len(), table.name, path.display());
        Ok(())
    }

    pub fn load_table(&self, table: &str) -> StorageResult<EncodedTable> {
        let path = self.table_path(table);
        if !path.exists() {
            return Err(StorageError::MissingTable(table.to_string()));
        }
        read_binary(&path)
    }

    pub fn save_metadata(&self, metadata: &BTreeMap<String, TableMetadata>) -> StorageResult<()> {
        let path = self.root.join(METADATA_FILE);
        let raw = serde_json::to_vec_pretty(metadata)?;
        fs::write(&path, raw).map_err(io_error(&path))
    }

    pub fn load_metadata(&self) -> StorageResult<BTreeMap<String, TableMetadata>> {
        let path = self.root.join(METADATA_FILE);
        let raw = fs::read(&path).map_err(io_error(&path))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}

fn write_binary<T: Serialize>(path: &Path, value: &T) -> StorageResult<()> {
    let bytes = bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| StorageError::Encode(e.to_string()))?;
    fs::write(path, bytes).map_err(io_error(path))
}

fn read_binary<T: DeserializeOwned>(path: &Path) -> StorageResult<T> {
    let bytes = fs::read(path).map_err(io_error(path))?;
    let (value, _): (T, _) = bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(|e| StorageError::Decode(e.to_string()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> EncodedTable {
        EncodedTable {
            name: "orders".to_string(),
            columns: vec!["orders.id".to_string(), "orders.customer_id".to_string()],
            data: vec![vec![1.0, 2.0], vec![7.0, 7.0]],
        }
    }

    #[test]
    fn test_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreparedStore::open(dir.path().join("prepared")).unwrap();

        store.save_table(&table()).unwrap();
        assert_eq!(store.load_table("orders").unwrap(), table());
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreparedStore::open(dir.path()).unwrap();
        assert!(matches!(store.load_table("nope"), Err(StorageError::MissingTable(_))));
        assert!(matches!(store.load_metadata(), Err(StorageError::Io { .. })));
    }

    #[test]
    fn test_corrupt_table_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreparedStore::open(dir.path()).unwrap();
        fs::write(store.table_path("orders"), [0xff, 0xff, 0xff]).unwrap();
        assert!(matches!(store.load_table("orders"), Err(StorageError::Decode(_))));
    }

    #[test]
    fn test_metadata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreparedStore::open(dir.path()).unwrap();

        let mut metadata = BTreeMap::new();
        let mut orders = TableMetadata {
            table: "orders".to_string(),
            length: 2,
            stored_length: 2,
            sample_rate: 1.0,
            ..Default::default()
        };
        orders.null_values.insert("orders.id".to_string(), 1.5001);
        metadata.insert("orders".to_string(), orders);

        store.save_metadata(&metadata).unwrap();
        assert_eq!(store.load_metadata().unwrap(), metadata);
    }
}
