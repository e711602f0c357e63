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
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

use super::{AlgebraResult, IndicatorExpectation};

/// Evaluated indicator expectations, shared by every model of an ensemble.
///
/// A term is answered from an entry that matches it, or from the reciprocal of an entry it is
/// the inverse of.
#[derive(Debug, Default)]
pub struct TermMemo {
    entries: RwLock<HashMap<u64, Vec<(IndicatorExpectation, f64)>>>,
    hits: AtomicUsize,
}

impl TermMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, term: &IndicatorExpectation) -> Option<f64> {
        let entries = self.entries.read();
        let exact = entries
            .get(&term.structural_hash())
            .and_then(|bucket| bucket.iter().find(|(known, _)| known.matches(term, false, false)))
            .map(|(_, value)| *value);
        let value = exact.or_else(|| {
            let flipped = term.clone().inverted();
            entries
                .get(&flipped.structural_hash())
                .and_then(|bucket| bucket.iter().find(|(known, value)| known.is_inverse(term) && *value != 0.0))
                .map(|(_, value)| 1.0 / value)
        })?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!("Reused{}", term);
        Some(value)
    }

    pub fn insert(&self, term: IndicatorExpectation, value: f64) {
        let mut entries = self.entries.write();
        let bucket = entries.entry(term.structural_hash()).or_default();
        if !bucket.iter().any(|(known, _)| known.matches(&term, false, false)) {
            bucket.push((term, value));
        }
    }

    /// Returns the memoized value of `term` or evaluates and records it.
    pub fn get_or_evaluate<F>(&self, term: &IndicatorExpectation, evaluate: F) -> AlgebraResult<f64>
    where
        F: FnOnce(&IndicatorExpectation) -> AlgebraResult<f64>,
    {
        if let Some(value) = self.get(term) {
            return Ok(value);
        }
        let value = evaluate(term)?;
        self.insert(term.clone(), value);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookups answered without evaluating.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::AlgebraError;
    use crate::query::Condition;
    use aqpdb_common::AttributeRef;
    use std::sync::Arc;

    fn term() -> IndicatorExpectation {
        IndicatorExpectation::new(
            vec![AttributeRef::new("customers", "mul_orders.customer_id")],
            vec![Condition::parse("orders", "customer_id=5").unwrap()],
        )
    }

    #[test]
    fn test_exact_reuse() {
        let memo = TermMemo::new();
        assert_eq!(memo.get_or_evaluate(&term(), |_| Ok(0.25)).unwrap(), 0.25);
        let value = memo.get_or_evaluate(&term(), |_| panic!("evaluated twice")).unwrap();
        assert_eq!(value, 0.25);
        assert_eq!(memo.len(), 1);
        assert_eq!(memo.hits(), 1);
    }

    #[test]
    fn test_inverse_reuse() {
        let memo = TermMemo::new();
        memo.insert(term(), 0.25);
        assert_eq!(memo.get(&term().inverted()), Some(4.0));

        memo.clear();
        memo.insert(term().inverted(), 4.0);
        assert_eq!(memo.get(&term()), Some(0.25));
    }

    #[test]
    fn test_zero_is_not_inverted() {
        let memo = TermMemo::new();
        memo.insert(term(), 0.0);
        assert_eq!(memo.get(&term().inverted()), None);
        assert_eq!(memo.get(&term()), Some(0.0));
    }

    #[test]
    fn test_errors_are_not_memoized() {
        let memo = TermMemo::new();
        let err = memo.get_or_evaluate(&term(), |_| Err(AlgebraError::Model("diverged".to_string())));
        assert!(err.is_err());
        assert!(memo.is_empty());
    }

    #[test]
    fn test_concurrent_evaluation() {
        let memo = Arc::new(TermMemo::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let memo = Arc::clone(&memo);
                std::thread::spawn(move || memo.get_or_evaluate(&term(), |_| Ok(0.5)).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 0.5);
        }
        assert_eq!(memo.len(), 1);
    }
}
