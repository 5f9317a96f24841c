//! Entitlement persistence.
//!
//! A store maps product identifiers to a purchased flag. The manager writes it
//! only after a receipt validates, and reads it back at startup.

mod error;
mod memory;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use iapkit_receipt::ProductSet;

/// Key-value persistence of purchased products.
pub trait EntitlementStore: Send + Sync {
    /// Records whether `product_id` is purchased.
    fn set(&self, product_id: &str, purchased: bool) -> StoreResult<()>;

    /// Returns the recorded flag, or `false` if nothing is recorded.
    fn get(&self, product_id: &str) -> StoreResult<bool>;

    /// Forgets `product_id`.
    fn remove(&self, product_id: &str) -> StoreResult<()>;

    /// Removes every id in `old`, then marks every id in `new` purchased.
    fn replace(&self, old: &ProductSet, new: &ProductSet) -> StoreResult<()> {
        for product_id in old {
            self.remove(product_id)?;
        }
        for product_id in new {
            self.set(product_id, true)?;
        }
        Ok(())
    }

    /// Returns the subset of `product_ids` recorded as purchased.
    fn load_purchased(&self, product_ids: &ProductSet) -> StoreResult<ProductSet> {
        let mut purchased = ProductSet::new();
        for product_id in product_ids {
            if self.get(product_id)? {
                purchased.insert(product_id.clone());
            }
        }
        Ok(purchased)
    }
}
