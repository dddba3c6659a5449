//! Filesystem read-cache for plugin code payloads.
//!
//! One JSON file per key. Writes go to a temp file first and are renamed
//! over the target, so a concurrent reader never observes a half-written
//! payload; a per-key lock serializes writers for the same key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::PluginResult;
use crate::manifest::PluginData;

#[derive(Debug)]
pub struct CodeCache {
    dir: PathBuf,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CodeCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            locks: DashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for `key`.
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn exists(&self, key: &str) -> bool {
        self.path(key).exists()
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Write the payload for `key`, replacing any previous file atomically.
    pub async fn save(&self, data: &PluginData, key: &str) -> PluginResult<()> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        std::fs::create_dir_all(&self.dir)?;
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        std::fs::write(&tmp, serde_json::to_vec(data)?)?;
        std::fs::rename(&tmp, self.path(key))?;
        Ok(())
    }

    /// Parse the cached payload; `None` when no file exists.
    ///
    /// Lock-free: the rename in `save` guarantees readers see either the old
    /// or the new payload, never a partial one.
    pub async fn load(&self, key: &str) -> PluginResult<Option<PluginData>> {
        let raw = match std::fs::read(self.path(key)) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Remove the cache file; a missing file is a success no-op.
    pub async fn delete(&self, key: &str) -> PluginResult<()> {
        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::CodePayload;
    use tempfile::tempdir;

    fn payload(code: &str) -> PluginData {
        PluginData {
            content: CodePayload::comm(code),
            ts_content: CodePayload::ts("export {};"),
        }
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let cache = CodeCache::new(dir.path());

        assert!(cache.load("pay").await.unwrap().is_none());

        let data = payload("module.exports = {}");
        cache.save(&data, "pay").await.unwrap();
        assert!(cache.exists("pay"));
        assert_eq!(cache.load("pay").await.unwrap().unwrap(), data);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_payload() {
        let dir = tempdir().unwrap();
        let cache = CodeCache::new(dir.path());

        cache.save(&payload("v1"), "pay").await.unwrap();
        cache.save(&payload("v2"), "pay").await.unwrap();

        let loaded = cache.load("pay").await.unwrap().unwrap();
        assert_eq!(loaded.content.data, "v2");
        // no temp file left behind
        assert!(!dir.path().join("pay.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_delete_missing_is_noop() {
        let dir = tempdir().unwrap();
        let cache = CodeCache::new(dir.path());

        cache.delete("absent").await.unwrap();

        cache.save(&payload("x"), "pay").await.unwrap();
        cache.delete("pay").await.unwrap();
        assert!(!cache.exists("pay"));
    }

    #[tokio::test]
    async fn test_concurrent_writers_leave_valid_file() {
        let dir = tempdir().unwrap();
        let cache = Arc::new(CodeCache::new(dir.path()));

        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.save(&payload(&format!("v{}", i)), "pay").await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // whichever writer won, the file parses
        assert!(cache.load("pay").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let cache = CodeCache::new(dir.path().join("nested").join("plugins"));

        cache.save(&payload("x"), "pay").await.unwrap();
        assert!(cache.exists("pay"));
    }
}
