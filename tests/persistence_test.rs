use glowmarkt_bridge::persistence::{
    ConfigStore, MemoryStore, PersistenceManager, TOKEN_EXPIRY_KEY, TOKEN_KEY,
};
use serde_json::json;

#[test]
fn missing_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json").to_string_lossy().to_string();
    let mgr = PersistenceManager::open(&path).unwrap();
    assert!(mgr.get(TOKEN_KEY).is_none());
}

#[test]
fn set_writes_through_to_disk() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path().to_string_lossy().to_string();

    let mut mgr = PersistenceManager::new(&path);
    mgr.set(TOKEN_KEY, json!("abc")).unwrap();
    mgr.set(TOKEN_EXPIRY_KEY, json!("2030-01-01T00:00:00+00:00"))
        .unwrap();

    let mgr2 = PersistenceManager::open(&path).unwrap();
    assert_eq!(mgr2.get(TOKEN_KEY), Some(json!("abc")));
    assert_eq!(
        mgr2.get(TOKEN_EXPIRY_KEY),
        Some(json!("2030-01-01T00:00:00+00:00"))
    );
}

#[test]
fn set_preserves_other_keys() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let path = tmp.path().to_string_lossy().to_string();
    std::fs::write(&path, r#"{"token": "old", "other": {"x": 1}}"#).unwrap();

    let mut mgr = PersistenceManager::open(&path).unwrap();
    mgr.set(TOKEN_KEY, json!("new")).unwrap();

    let reloaded = PersistenceManager::open(&path).unwrap();
    assert_eq!(reloaded.get(TOKEN_KEY), Some(json!("new")));
    assert_eq!(reloaded.get("other"), Some(json!({"x": 1})));
}

#[test]
fn non_object_state_is_ignored() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), b"[1,2,3]").unwrap();
    let mgr = PersistenceManager::open(&tmp.path().to_string_lossy()).unwrap();
    assert!(mgr.get(TOKEN_KEY).is_none());
}

#[test]
fn memory_store_roundtrip() {
    let mut store = MemoryStore::new();
    store.set("k", json!(5)).unwrap();
    assert_eq!(store.get("k"), Some(json!(5)));
    assert!(store.get("missing").is_none());
}
