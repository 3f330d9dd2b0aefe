//! Submission-time member identifiers resolved to persisted ids.

use std::collections::HashMap;

use intake_core::{RecordId, SubmissionKey};

/// Per-pass lookup from the key a member carried in the submission to its
/// persisted id.
///
/// Existing members map to themselves, new members map their placeholder to
/// the id the store assigned. Deleted members are never entered, so a vehicle
/// still pointing at one fails to resolve.
#[derive(Debug, Default, Clone)]
pub struct IdMapping {
    entries: HashMap<SubmissionKey, RecordId>,
}

impl IdMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an existing member under its own id.
    pub fn insert_existing(&mut self, id: RecordId) {
        self.entries.insert(SubmissionKey::from(id), id);
    }

    /// Records a newly created member under its placeholder.
    ///
    /// Returns the id previously stored under the same key, if any.
    pub fn insert(&mut self, key: SubmissionKey, id: RecordId) -> Option<RecordId> {
        self.entries.insert(key, id)
    }

    pub fn resolve(&self, key: &SubmissionKey) -> Option<RecordId> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
