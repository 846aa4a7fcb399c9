//! External id to store handle mapping.
//!
//! Maps caller-chosen object ids to the u64 handles used by the vector store,
//! together with each record's timestamp. Persisted as JSON next to the
//! serialized graph.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::VectorError;

/// File name of the serialized id map inside a snapshot directory.
pub const IDMAP_FILE_NAME: &str = "idmap.json";

/// Handle and timestamp of one committed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdEntry {
    pub handle: u64,
    pub timestamp: i64,
}

#[derive(Serialize, Deserialize)]
struct IdMapFile {
    next_handle: u64,
    entries: BTreeMap<String, IdEntry>,
}

/// Bidirectional id map. Entries are created and destroyed together with
/// the corresponding store vectors.
#[derive(Debug, Default)]
pub struct IdMap {
    by_id: HashMap<String, IdEntry>,
    by_handle: HashMap<u64, String>,
    next_handle: u64,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<IdEntry> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn id_of(&self, handle: u64) -> Option<&str> {
        self.by_handle.get(&handle).map(String::as_str)
    }

    /// Handle for `id`, reusing the existing one or allocating a fresh one.
    /// Nothing is recorded until [`IdMap::insert`].
    pub fn handle_for(&mut self, id: &str) -> u64 {
        if let Some(entry) = self.by_id.get(id) {
            return entry.handle;
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    /// Record `id` under `handle`, replacing any previous entry for the id.
    pub fn insert(&mut self, id: &str, handle: u64, timestamp: i64) {
        if let Some(old) = self.by_id.insert(id.to_string(), IdEntry { handle, timestamp }) {
            if old.handle != handle {
                self.by_handle.remove(&old.handle);
            }
        }
        self.by_handle.insert(handle, id.to_string());
        if handle >= self.next_handle {
            self.next_handle = handle + 1;
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<IdEntry> {
        let entry = self.by_id.remove(id)?;
        self.by_handle.remove(&entry.handle);
        Some(entry)
    }

    /// All entries ordered by id.
    pub fn entries(&self) -> Vec<(String, IdEntry)> {
        let mut entries: Vec<_> = self
            .by_id
            .iter()
            .map(|(id, entry)| (id.clone(), *entry))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// All handles in ascending order.
    pub fn handles(&self) -> Vec<u64> {
        let mut handles: Vec<u64> = self.by_handle.keys().copied().collect();
        handles.sort_unstable();
        handles
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_handle.clear();
        self.next_handle = 0;
    }

    /// Write the map into `dir`, keeping only ids accepted by `keep`.
    /// Returns the number of entries written.
    pub fn save_filtered<F>(&self, dir: &Path, keep: F) -> Result<usize, VectorError>
    where
        F: Fn(&IdEntry) -> bool,
    {
        let file = IdMapFile {
            next_handle: self.next_handle,
            entries: self
                .by_id
                .iter()
                .filter(|(_, entry)| keep(entry))
                .map(|(id, entry)| (id.clone(), *entry))
                .collect(),
        };
        let count = file.entries.len();

        let path = dir.join(IDMAP_FILE_NAME);
        let staging = dir.join(format!("{}.tmp", IDMAP_FILE_NAME));
        {
            let mut f = fs::File::create(&staging)?;
            serde_json::to_writer(&mut f, &file)?;
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(&staging, &path)?;

        debug!(path = ?path, entries = count, "Saved id map");
        Ok(count)
    }

    /// Read a map previously written with [`IdMap::save_filtered`].
    pub fn load(dir: &Path) -> Result<Self, VectorError> {
        let path = dir.join(IDMAP_FILE_NAME);
        let bytes = fs::read(&path)?;
        let file: IdMapFile = serde_json::from_slice(&bytes)?;

        let mut map = IdMap {
            next_handle: file.next_handle,
            ..Default::default()
        };
        for (id, entry) in file.entries {
            if map.by_handle.contains_key(&entry.handle) {
                return Err(VectorError::Corrupted(format!(
                    "handle {} mapped twice",
                    entry.handle
                )));
            }
            map.insert(&id, entry.handle, entry.timestamp);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_insert_and_lookup() {
        let mut map = IdMap::new();
        let h = map.handle_for("a");
        map.insert("a", h, 10);

        assert_eq!(map.get("a"), Some(IdEntry { handle: h, timestamp: 10 }));
        assert_eq!(map.id_of(h), Some("a"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_handle_reuse_and_allocation() {
        let mut map = IdMap::new();
        let a = map.handle_for("a");
        map.insert("a", a, 1);
        let b = map.handle_for("b");
        assert_ne!(a, b);

        // Existing ids keep their handle
        assert_eq!(map.handle_for("a"), a);
        map.insert("a", a, 2);
        assert_eq!(map.get("a").unwrap().timestamp, 2);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove_keeps_maps_in_sync() {
        let mut map = IdMap::new();
        let h = map.handle_for("a");
        map.insert("a", h, 1);

        let removed = map.remove("a").unwrap();
        assert_eq!(removed.handle, h);
        assert!(map.id_of(h).is_none());
        assert!(map.remove("a").is_none());
        assert!(map.is_empty());
    }

    #[test]
    fn test_entries_sorted() {
        let mut map = IdMap::new();
        for id in ["c", "a", "b"] {
            let h = map.handle_for(id);
            map.insert(id, h, 0);
        }
        let ids: Vec<String> = map.entries().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let mut map = IdMap::new();
        for (i, id) in ["x", "y", "z"].iter().enumerate() {
            let h = map.handle_for(id);
            map.insert(id, h, i as i64);
        }

        let written = map.save_filtered(temp.path(), |e| e.timestamp != 1).unwrap();
        assert_eq!(written, 2);

        let mut loaded = IdMap::load(temp.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.contains("x"));
        assert!(!loaded.contains("y"));
        // New handles never collide with saved ones
        let fresh = loaded.handle_for("w");
        assert!(fresh >= 3);
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(IdMap::load(temp.path()), Err(VectorError::Io(_))));
    }
}
