//! Activity name interning
//!
//! Method and assembly names repeat on every enter/leave event. Interning
//! them once hands every ledger key, interval-store key and snapshot entry a
//! shared `Arc<str>` instead of a fresh `String` per call.

use dashmap::DashSet;
use fnv::FnvBuildHasher;
use std::sync::Arc;

/// Concurrent set of interned names
#[derive(Debug, Default)]
pub struct NameRegistry {
    names: DashSet<Arc<str>, FnvBuildHasher>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared copy of `name`, inserting it on first sight
    pub fn intern(&self, name: &str) -> Arc<str> {
        if let Some(existing) = self.names.get(name) {
            return existing.key().clone();
        }

        let candidate: Arc<str> = Arc::from(name);
        if self.names.insert(candidate.clone()) {
            return candidate;
        }

        // Lost an insert race; prefer the winner's allocation
        self.names
            .get(name)
            .map(|existing| existing.key().clone())
            .unwrap_or(candidate)
    }

    /// Shared copy of `name` if it was interned before; never inserts
    pub fn get(&self, name: &str) -> Option<Arc<str>> {
        self.names.get(name).map(|existing| existing.key().clone())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
