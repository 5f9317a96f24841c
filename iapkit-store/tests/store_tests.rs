use iapkit_receipt::ProductSet;
use iapkit_store::{EntitlementStore, MemoryStore, SqliteStore};
use pretty_assertions::assert_eq;

fn products(ids: &[&str]) -> ProductSet {
    ids.iter().map(|id| (*id).to_string()).collect()
}

/// Behaviour every store must share.
fn exercise(store: &dyn EntitlementStore) {
    assert!(!store.get("A").unwrap());

    store.set("A", true).unwrap();
    store.set("B", false).unwrap();
    assert!(store.get("A").unwrap());
    assert!(!store.get("B").unwrap());

    store.set("A", false).unwrap();
    assert!(!store.get("A").unwrap());

    store.set("A", true).unwrap();
    store.remove("A").unwrap();
    assert!(!store.get("A").unwrap());

    // Removing an unknown product is not an error.
    store.remove("missing").unwrap();
}

fn exercise_replace(store: &dyn EntitlementStore) {
    store.replace(&ProductSet::new(), &products(&["A", "B"])).unwrap();
    assert_eq!(
        store.load_purchased(&products(&["A", "B", "C"])).unwrap(),
        products(&["A", "B"])
    );

    store
        .replace(&products(&["A", "B"]), &products(&["B", "C"]))
        .unwrap();
    assert!(!store.get("A").unwrap());
    assert!(store.get("B").unwrap());
    assert!(store.get("C").unwrap());
    assert_eq!(
        store.load_purchased(&products(&["A", "B", "C"])).unwrap(),
        products(&["B", "C"])
    );
}

// ── Memory store ────────────────────────────────────────────────

#[test]
fn memory_store_basics() {
    exercise(&MemoryStore::new());
}

#[test]
fn memory_store_replace() {
    exercise_replace(&MemoryStore::new());
}

#[test]
fn memory_store_counts_writes() {
    let store = MemoryStore::new();
    assert_eq!(store.writes(), 0);
    store.replace(&products(&["A"]), &products(&["B", "C"])).unwrap();
    assert_eq!(store.writes(), 3);
    store.get("B").unwrap();
    store.load_purchased(&products(&["B"])).unwrap();
    assert_eq!(store.writes(), 3);
    assert_eq!(store.len().unwrap(), 2);
}

// ── SQLite store ────────────────────────────────────────────────

#[test]
fn sqlite_store_basics() {
    exercise(&SqliteStore::open_in_memory().unwrap());
}

#[test]
fn sqlite_store_replace() {
    exercise_replace(&SqliteStore::open_in_memory().unwrap());
}

#[test]
fn sqlite_store_lists_purchased() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.set("B", true).unwrap();
    store.set("A", true).unwrap();
    store.set("C", false).unwrap();
    assert_eq!(store.all_purchased().unwrap(), products(&["A", "B"]));
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entitlements.db");
    {
        let store = SqliteStore::new(&path).unwrap();
        store.replace(&ProductSet::new(), &products(&["pro"])).unwrap();
    }
    let reopened = SqliteStore::new(&path).unwrap();
    assert!(reopened.get("pro").unwrap());
    assert_eq!(reopened.all_purchased().unwrap(), products(&["pro"]));
}

#[test]
fn sqlite_store_clones_share_connection() {
    let store = SqliteStore::open_in_memory().unwrap();
    let clone = store.clone();
    store.set("A", true).unwrap();
    assert!(clone.get("A").unwrap());
}

#[test]
fn sqlite_store_rejects_directory_path() {
    let dir = tempfile::tempdir().unwrap();
    assert!(SqliteStore::new(dir.path()).is_err());
}
