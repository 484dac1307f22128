//! Record reference store
//!
//! Maps challenge tokens to the reference the backend returned on creation.
//! Shared by every concurrent `present` / `cleanup` flow of an engine.

use dashmap::DashMap;

use crate::backend::RecordReference;

/// Concurrency-safe token -> record reference map.
///
/// Each operation is atomic per token. The map lives as long as the engine
/// and is not persisted.
#[derive(Debug, Default)]
pub struct RecordStore {
    references: DashMap<String, RecordReference>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the reference for `token`
    pub fn put(&self, token: &str, reference: RecordReference) {
        self.references.insert(token.to_string(), reference);
    }

    pub fn get(&self, token: &str) -> Option<RecordReference> {
        self.references.get(token).map(|r| r.value().clone())
    }

    /// Remove the entry for `token`, returning it if present
    pub fn remove(&self, token: &str) -> Option<RecordReference> {
        self.references.remove(token).map(|(_, reference)| reference)
    }

    /// Number of outstanding challenges
    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}
