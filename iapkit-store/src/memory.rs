//! In-process entitlement store.

use crate::error::{StoreError, StoreResult};
use crate::EntitlementStore;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Entitlements held in a map. Counts writes so callers can observe no-op runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, bool>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` and `remove` calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of recorded products.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.entries.lock().map_err(|_| StoreError::Lock)?.len())
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

impl EntitlementStore for MemoryStore {
    fn set(&self, product_id: &str, purchased: bool) -> StoreResult<()> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Lock)?
            .insert(product_id.to_string(), purchased);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, product_id: &str) -> StoreResult<bool> {
        let entries = self.entries.lock().map_err(|_| StoreError::Lock)?;
        Ok(entries.get(product_id).copied().unwrap_or(false))
    }

    fn remove(&self, product_id: &str) -> StoreResult<()> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Lock)?
            .remove(product_id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
