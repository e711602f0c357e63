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

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::prep::EncodedTable;
use crate::storage::StorageResult;

/// Lazily filled cache of encoded tables.
///
/// Each key is loaded at most once; concurrent first accesses serialize on the write lock and
/// the losers see the winner's entry. Cached tables are only handed out behind `Arc`.
#[derive(Debug, Default)]
pub struct TableCache {
    entries: RwLock<HashMap<String, Arc<EncodedTable>>>,
    disabled: bool,
}

impl TableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache that never stores anything; every access loads afresh.
    pub fn disabled() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            disabled: true,
        }
    }

    pub fn get(&self, table: &str) -> Option<Arc<EncodedTable>> {
        self.entries.read().get(table).cloned()
    }

    pub fn get_or_load<F>(&self, table: &str, load: F) -> StorageResult<Arc<EncodedTable>>
    where
        F: FnOnce() -> StorageResult<EncodedTable>,
    {
        if let Some(cached) = self.get(table) {
            return Ok(cached);
        }
        if self.disabled {
            return load().map(Arc::new);
        }

        let mut entries = self.entries.write();
        if let Some(cached) = entries.get(table) {
            return Ok(Arc::clone(cached));
        }
        let loaded = Arc::new(load()?);
        debug!("Cached {} rows of {}", loaded.len(), table);
        entries.insert(table.to_string(), Arc::clone(&loaded));
        Ok(loaded)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn table(name: &str) -> EncodedTable {
        EncodedTable {
            name: name.to_string(),
            columns: vec![format!("{name}.id")],
            data: vec![vec![1.0, 2.0]],
        }
    }

    #[test]
    fn test_loads_once() {
        let cache = TableCache::new();
        let loads = AtomicUsize::new(0);

        for _ in 0..3 {
            let loaded = cache
                .get_or_load("orders", || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(table("orders"))
                })
                .unwrap();
            assert_eq!(loaded.len(), 2);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_first_access_fills_once() {
        let cache = Arc::new(TableCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                std::thread::spawn(move || {
                    cache
                        .get_or_load("customers", || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            Ok(table("customers"))
                        })
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<Arc<EncodedTable>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_failed_load_is_not_cached() {
        let cache = TableCache::new();
        let result = cache.get_or_load("orders", || Err(StorageError::MissingTable("orders".to_string())));
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_disabled_cache_always_loads() {
        let cache = TableCache::disabled();
        let loads = AtomicUsize::new(0);
        for _ in 0..2 {
            cache
                .get_or_load("orders", || {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok(table("orders"))
                })
                .unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 2);
        assert!(cache.get("orders").is_none());
    }
}
