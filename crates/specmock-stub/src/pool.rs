//! The live stub pool.
//!
//! Readers take an `Arc` snapshot of the entry list and match against it
//! without holding any lock. Writers build a new list and swap it in under a
//! short write lock, so a reader always sees a complete list from before or
//! after a change.

use crate::error::StubError;
use crate::stub::{StubEntry, StubOrigin};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub type Snapshot = Arc<Vec<Arc<StubEntry>>>;

#[derive(Debug, Default)]
pub struct StubPool {
    entries: RwLock<Snapshot>,
    next_seq: AtomicU64,
}

impl StubPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current entries. The returned list never changes.
    pub fn snapshot(&self) -> Snapshot {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add one entry, assigning its sequence number.
    pub fn insert(&self, entry: StubEntry) -> Result<Arc<StubEntry>, StubError> {
        self.insert_all(vec![entry])?
            .pop()
            .ok_or_else(|| StubError::InvalidShape("empty insert".to_string()))
    }

    /// Add several entries in one swap. Fails without changing the pool if
    /// any token is already taken.
    pub fn insert_all(&self, entries: Vec<StubEntry>) -> Result<Vec<Arc<StubEntry>>, StubError> {
        let mut guard = self.entries.write();
        let mut next: Vec<Arc<StubEntry>> = (**guard).clone();
        let mut added = Vec::with_capacity(entries.len());
        for mut entry in entries {
            if next.iter().any(|e| e.token == entry.token) {
                return Err(StubError::DuplicateToken(entry.token));
            }
            entry.seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let entry = Arc::new(entry);
            next.push(Arc::clone(&entry));
            added.push(entry);
        }
        *guard = Arc::new(next);
        debug!(added = added.len(), total = guard.len(), "Stub pool updated");
        Ok(added)
    }

    /// Remove the entry with `token`, returning it if present.
    pub fn remove(&self, token: &str) -> Option<Arc<StubEntry>> {
        let mut guard = self.entries.write();
        let position = guard.iter().position(|e| e.token == token)?;
        let mut next: Vec<Arc<StubEntry>> = (**guard).clone();
        let removed = next.remove(position);
        *guard = Arc::new(next);
        Some(removed)
    }

    /// Drop every transient entry, keeping file-loaded ones.
    pub fn clear_transient(&self) -> usize {
        let mut guard = self.entries.write();
        let next: Vec<Arc<StubEntry>> = guard
            .iter()
            .filter(|e| e.origin != StubOrigin::Transient)
            .cloned()
            .collect();
        let removed = guard.len() - next.len();
        *guard = Arc::new(next);
        removed
    }
}
