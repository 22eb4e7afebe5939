//! Shared results map
//!
//! The only state mutated by more than one worker. The map and the completed
//! counter sit behind a single mutex so progress always agrees with the map.

use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A successfully synthesized chunk. Failures are reported separately, so
/// every entry in the store is a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisResult {
    pub chunk_index: usize,
    pub output_path: PathBuf,
}

#[derive(Debug, Default)]
struct Inner {
    results: BTreeMap<usize, SynthesisResult>,
    completed: usize,
}

/// Append-only, first-success-wins map from chunk index to output file.
///
/// Each chunk is queued at most once per pass and passes never overlap, so
/// two workers never race to write the same chunk file.
#[derive(Debug)]
pub struct ResultStore {
    total: usize,
    inner: Mutex<Inner>,
}

impl ResultStore {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Record a successful chunk. Returns false, leaving the existing entry
    /// untouched, if the index already has a result or is out of range.
    pub fn record_success(&self, chunk_index: usize, output_path: PathBuf) -> bool {
        if chunk_index == 0 || chunk_index > self.total {
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.results.contains_key(&chunk_index) {
            return false;
        }
        inner.results.insert(
            chunk_index,
            SynthesisResult {
                chunk_index,
                output_path,
            },
        );
        inner.completed += 1;
        true
    }

    pub fn contains(&self, chunk_index: usize) -> bool {
        self.inner.lock().results.contains_key(&chunk_index)
    }

    pub fn completed(&self) -> usize {
        self.inner.lock().completed
    }

    /// Completed fraction in `[0, 1]`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.completed() as f64 / self.total as f64
    }

    pub fn is_complete(&self) -> bool {
        self.completed() == self.total
    }

    pub fn completed_indices(&self) -> BTreeSet<usize> {
        self.inner.lock().results.keys().copied().collect()
    }

    /// Output paths in ascending chunk index order
    pub fn ordered_paths(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .results
            .values()
            .map(|r| r.output_path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_success_wins() {
        let store = ResultStore::new(3);
        assert!(store.record_success(2, PathBuf::from("a.mp3")));
        assert!(!store.record_success(2, PathBuf::from("b.mp3")));
        assert_eq!(store.completed(), 1);
        assert_eq!(store.ordered_paths(), vec![PathBuf::from("a.mp3")]);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let store = ResultStore::new(2);
        assert!(!store.record_success(0, PathBuf::from("x")));
        assert!(!store.record_success(3, PathBuf::from("x")));
        assert_eq!(store.completed(), 0);
    }

    #[test]
    fn test_ordered_paths_follow_index() {
        let store = ResultStore::new(3);
        store.record_success(3, PathBuf::from("c"));
        store.record_success(1, PathBuf::from("a"));
        store.record_success(2, PathBuf::from("b"));
        assert_eq!(
            store.ordered_paths(),
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
        assert!(store.is_complete());
        assert_eq!(store.fraction(), 1.0);
    }

    #[test]
    fn test_fraction() {
        let store = ResultStore::new(4);
        store.record_success(1, PathBuf::from("a"));
        assert_eq!(store.fraction(), 0.25);
        assert_eq!(
            store.completed_indices().into_iter().collect::<Vec<_>>(),
            vec![1]
        );
    }
}
