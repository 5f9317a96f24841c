//! Reconciliation of persisted entitlements with a validated product set.

use iapkit_receipt::ProductSet;
use iapkit_store::{EntitlementStore, StoreResult};

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The validated set equalled the current one; nothing was written.
    Unchanged,
    /// Persisted and in-memory state now hold the validated set.
    Updated {
        added: ProductSet,
        removed: ProductSet,
    },
}

impl Reconciliation {
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// Makes `current` and `store` reflect `validated`.
///
/// Equal sets are a no-op with no store writes. Otherwise the store drops the old
/// set and records the new one, and only then is `current` replaced, so a store
/// failure leaves `current` as it was.
///
/// # Errors
///
/// Returns the store error, if any.
pub fn reconcile(
    current: &mut ProductSet,
    validated: ProductSet,
    store: &dyn EntitlementStore,
) -> StoreResult<Reconciliation> {
    if *current == validated {
        return Ok(Reconciliation::Unchanged);
    }
    store.replace(current, &validated)?;
    let added = validated.difference(current).cloned().collect();
    let removed = current.difference(&validated).cloned().collect();
    *current = validated;
    Ok(Reconciliation::Updated { added, removed })
}
