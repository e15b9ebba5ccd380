//! Integration tests for `DurableStore`: namespacing, expiry and the
//! best-effort failure policy.

use std::time::Duration;

use otpgate_store::{
    DurableStore, FileStorage, ManualClock, MemoryStorage, StorageBackend,
    StoreError,
};

// =========================================================================
// Helpers
// =========================================================================

fn store_with_clock() -> (DurableStore, MemoryStorage, ManualClock) {
    let backend = MemoryStorage::new();
    let clock = ManualClock::new(1_700_000_000_000);
    let store = DurableStore::new(backend.clone()).with_clock(clock.clone());
    (store, backend, clock)
}

/// A backend whose writes always fail, like a full quota.
struct FullBackend;

impl StorageBackend for FullBackend {
    fn get_item(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Rejected("unavailable".into()))
    }
    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
        Err(StoreError::Rejected("quota exceeded".into()))
    }
    fn remove_item(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Rejected("unavailable".into()))
    }
    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Rejected("unavailable".into()))
    }
}

// =========================================================================
// get / set / remove
// =========================================================================

#[test]
fn test_set_then_get_returns_value() {
    let (store, _, _) = store_with_clock();
    store.set("session_id", &"abc-123".to_string(), None);
    assert_eq!(store.get::<String>("session_id").as_deref(), Some("abc-123"));
}

#[test]
fn test_keys_are_namespaced_in_backend() {
    let (store, backend, _) = store_with_clock();
    store.set("session_id", &"abc".to_string(), None);

    assert!(backend.get_item("otpgate_session_id").unwrap().is_some());
    assert!(backend.get_item("session_id").unwrap().is_none());
}

#[test]
fn test_missing_key_is_none() {
    let (store, _, _) = store_with_clock();
    assert_eq!(store.get::<String>("nothing"), None);
}

#[test]
fn test_remove_deletes_entry() {
    let (store, _, _) = store_with_clock();
    store.set("k", &1u32, None);
    store.remove("k");
    assert_eq!(store.get::<u32>("k"), None);
}

// =========================================================================
// TTL
// =========================================================================

#[test]
fn test_entry_readable_before_ttl() {
    let (store, _, clock) = store_with_clock();
    store.set("k", &"v".to_string(), Some(Duration::from_secs(60)));
    clock.advance(Duration::from_secs(59));
    assert_eq!(store.get::<String>("k").as_deref(), Some("v"));
}

#[test]
fn test_expired_entry_is_none_and_deleted() {
    let (store, backend, clock) = store_with_clock();
    store.set("k", &"v".to_string(), Some(Duration::from_secs(60)));
    clock.advance(Duration::from_secs(60));

    assert_eq!(store.get::<String>("k"), None);
    assert!(backend.is_empty(), "expired entry should be removed");
}

#[test]
fn test_entry_without_ttl_never_expires() {
    let (store, _, clock) = store_with_clock();
    store.set("k", &7u64, None);
    clock.advance(Duration::from_secs(365 * 24 * 3600));
    assert_eq!(store.get::<u64>("k"), Some(7));
}

// =========================================================================
// clear
// =========================================================================

#[test]
fn test_clear_only_removes_own_namespace() {
    let (store, backend, _) = store_with_clock();
    backend.set_item("other_app_key", "keep me").unwrap();
    store.set("a", &1u8, None);
    store.set("b", &2u8, None);

    store.clear();

    assert_eq!(store.get::<u8>("a"), None);
    assert_eq!(store.get::<u8>("b"), None);
    assert_eq!(
        backend.get_item("other_app_key").unwrap().as_deref(),
        Some("keep me")
    );
}

#[test]
fn test_custom_namespace_isolates_stores() {
    let backend = MemoryStorage::new();
    let a = DurableStore::new(backend.clone()).with_namespace("a_");
    let b = DurableStore::new(backend).with_namespace("b_");

    a.set("k", &"from a".to_string(), None);
    assert_eq!(b.get::<String>("k"), None);
    b.clear();
    assert_eq!(a.get::<String>("k").as_deref(), Some("from a"));
}

// =========================================================================
// Failure absorption
// =========================================================================

#[test]
fn test_backend_failures_are_swallowed() {
    let store = DurableStore::new(FullBackend);
    store.set("k", &"v".to_string(), None);
    assert_eq!(store.get::<String>("k"), None);
    store.remove("k");
    store.clear();
}

#[test]
fn test_garbage_entry_reads_as_none_and_is_dropped() {
    let (store, backend, _) = store_with_clock();
    backend.set_item("otpgate_k", "definitely not json").unwrap();

    assert_eq!(store.get::<String>("k"), None);
    assert!(backend.get_item("otpgate_k").unwrap().is_none());
}

#[test]
fn test_wrong_type_reads_as_none() {
    let (store, _, _) = store_with_clock();
    store.set("k", &"text".to_string(), None);
    assert_eq!(store.get::<u32>("k"), None);
}

// =========================================================================
// File-backed persistence
// =========================================================================

#[test]
fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    DurableStore::new(FileStorage::new(&path)).set(
        "session_id",
        &"persisted".to_string(),
        Some(Duration::from_secs(24 * 3600)),
    );

    let reopened = DurableStore::new(FileStorage::new(&path));
    assert_eq!(
        reopened.get::<String>("session_id").as_deref(),
        Some("persisted")
    );
}
