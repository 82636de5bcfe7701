//! Persistence bookkeeping around a record value.

use crate::model::entity::Entity;
use std::ops::{Deref, DerefMut};

/// A record plus what storage last saw of it.
///
/// `original` is the last known persisted state and drives dirty checks;
/// `exists` says whether a save should update or insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<R: Entity> {
    current: R,
    original: Option<R>,
    exists: bool,
}

impl<R: Entity> Tracked<R> {
    /// Wraps a record that has not been persisted yet.
    pub fn new(record: R) -> Self {
        Self {
            current: record,
            original: None,
            exists: false,
        }
    }

    /// Wraps a record just loaded from storage.
    pub fn hydrated(record: R) -> Self {
        Self {
            original: Some(record.clone()),
            current: record,
            exists: true,
        }
    }

    pub fn get(&self) -> &R {
        &self.current
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.current
    }

    pub fn into_inner(self) -> R {
        self.current
    }

    pub fn original(&self) -> Option<&R> {
        self.original.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    /// Replaces the persisted snapshot with the current value.
    pub fn sync_original(&mut self) {
        self.original = Some(self.current.clone());
    }

    /// Applies a column-limited change to the persisted snapshot.
    ///
    /// No-op while the record has never been persisted.
    pub fn sync_original_with(&mut self, apply: impl FnOnce(&mut R)) {
        if let Some(original) = self.original.as_mut() {
            apply(original);
        }
    }
}

impl<R: Entity + PartialEq> Tracked<R> {
    /// Returns whether the current value differs from the persisted snapshot.
    pub fn is_dirty(&self) -> bool {
        self.original.as_ref() != Some(&self.current)
    }
}

impl<R: Entity> Deref for Tracked<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        &self.current
    }
}

impl<R: Entity> DerefMut for Tracked<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.current
    }
}
