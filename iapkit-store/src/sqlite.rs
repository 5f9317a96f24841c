//! SQLite-backed entitlement store.
//!
//! Uses its own table so entitlement state can live in a shared app database
//! without touching other data.

use crate::error::{StoreError, StoreResult};
use crate::EntitlementStore;
use chrono::Utc;
use iapkit_receipt::{ProductId, ProductSet};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Persistent entitlement store backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store at the given path.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let store = Self::from_connection(Connection::open(path)?)?;
        debug!(path = %path.display(), "Entitlement store opened");
        Ok(store)
    }

    /// Opens an in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entitlements (
                product_id TEXT PRIMARY KEY,
                purchased INTEGER NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Lock)
    }

    /// Every product currently recorded as purchased.
    pub fn all_purchased(&self) -> StoreResult<ProductSet> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT product_id FROM entitlements WHERE purchased = 1 ORDER BY product_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, ProductId>(0))?
            .collect::<Result<ProductSet, _>>()?;
        Ok(ids)
    }
}

fn upsert(conn: &Connection, product_id: &str, purchased: bool) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO entitlements (product_id, purchased, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(product_id) DO UPDATE SET purchased = excluded.purchased, updated_at = excluded.updated_at",
        params![product_id, purchased, Utc::now().to_rfc3339()],
    )
}

fn delete(conn: &Connection, product_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM entitlements WHERE product_id = ?1",
        params![product_id],
    )
}

impl EntitlementStore for SqliteStore {
    fn set(&self, product_id: &str, purchased: bool) -> StoreResult<()> {
        upsert(&*self.lock()?, product_id, purchased)?;
        Ok(())
    }

    fn get(&self, product_id: &str) -> StoreResult<bool> {
        let conn = self.lock()?;
        let purchased = conn
            .query_row(
                "SELECT purchased FROM entitlements WHERE product_id = ?1",
                params![product_id],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(purchased.unwrap_or(false))
    }

    fn remove(&self, product_id: &str) -> StoreResult<()> {
        delete(&*self.lock()?, product_id)?;
        Ok(())
    }

    /// Applies the whole replacement in one transaction.
    fn replace(&self, old: &ProductSet, new: &ProductSet) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for product_id in old {
            delete(&tx, product_id)?;
        }
        for product_id in new {
            upsert(&tx, product_id, true)?;
        }
        tx.commit()?;
        debug!(removed = old.len(), written = new.len(), "Entitlements replaced");
        Ok(())
    }
}
