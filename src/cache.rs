//! Content-addressed storage for fetched JSON payloads.
//!
//! The store is keyed by the exact requested URL, including its query string.
//! Entries are never invalidated: a hit always short-circuits the network,
//! regardless of age. Corrupt entries read as misses and fall through to a
//! fresh fetch.

use crate::util::sha256_hex;
use anyhow::{Context, Result};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Keyed store for parsed JSON payloads. Injected into the fetcher so tests
/// can swap the on-disk store for an in-memory one.
pub trait PayloadStore {
    /// Returns the stored payload, or `None` on a miss or unreadable entry.
    fn get(&self, key: &str) -> Option<Value>;
    /// Stores the payload for `key`, replacing any previous entry.
    fn put(&self, key: &str, payload: &Value) -> Result<()>;
}

/// On-disk store: one `<sha256-of-key>.json` file per key under a root
/// directory. The directory is created on first write and never pruned.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root
            .join(format!("{}.json", sha256_hex(key.as_bytes())))
    }
}

impl PayloadStore for DirStore {
    fn get(&self, key: &str) -> Option<Value> {
        let bytes = fs::read(self.entry_path(key)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn put(&self, key: &str, payload: &Value) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("create {}", self.root.display()))?;
        let path = self.entry_path(key);
        let bytes = serde_json::to_vec(payload).context("serialize cached payload")?;
        fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

/// In-memory store for tests. Single-threaded by construction, like the rest
/// of the run loop.
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl PayloadStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.borrow().get(key).cloned()
    }

    fn put(&self, key: &str, payload: &Value) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dir_store_round_trips_a_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path().join("cache"));
        let payload = json!({"name": "Parcels", "layers": []});
        store.put("https://example.com/svc?f=pjson", &payload).unwrap();
        assert_eq!(store.get("https://example.com/svc?f=pjson"), Some(payload));
    }

    #[test]
    fn dir_store_miss_and_corrupt_entry_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::new(dir.path().join("cache"));
        assert_eq!(store.get("https://example.com/missing"), None);

        store.put("https://example.com/bad", &json!({})).unwrap();
        fs::write(store.entry_path("https://example.com/bad"), b"{not json").unwrap();
        assert_eq!(store.get("https://example.com/bad"), None);
    }

    #[test]
    fn keys_include_the_query_string() {
        let store = DirStore::new("cache");
        assert_ne!(
            store.entry_path("https://example.com/svc?f=pjson"),
            store.entry_path("https://example.com/svc")
        );
    }

    #[test]
    fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.put("k", &json!(1)).unwrap();
        assert_eq!(store.get("k"), Some(json!(1)));
        assert_eq!(store.len(), 1);
    }
}
