//! On-disk snapshot layout.
//!
//! ```text
//! <index_path>/
//!   origin/          current snapshot (index.usearch, idmap.json, metadata.json)
//!   backup/          previous snapshot, copy-on-write only
//!   broken/<nanos>/  quarantined snapshots that failed to load
//!   tmp-<nanos>/     staging directory for a copy-on-write save
//! ```
//!
//! `metadata.json` is always written last. A snapshot whose metadata is
//! missing or marked invalid is never loaded.

use std::fs;
use std::path::{Path, PathBuf};

use ann_types::now_nanos;
use ann_vector::{IdMap, VectorError, VectorStore, IDMAP_FILE_NAME};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const METADATA_FILE_NAME: &str = "metadata.json";
const ORIGIN_DIR: &str = "origin";
const BACKUP_DIR: &str = "backup";
const BROKEN_DIR: &str = "broken";
const STAGING_PREFIX: &str = "tmp-";

/// Contents of `metadata.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub is_invalid: bool,
    pub index_count: u64,
    pub dimension: usize,
}

/// Paths of one agent's snapshot directories.
#[derive(Debug, Clone)]
pub struct SnapshotLayout {
    base: PathBuf,
}

impl SnapshotLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn origin(&self) -> PathBuf {
        self.base.join(ORIGIN_DIR)
    }

    pub fn backup(&self) -> PathBuf {
        self.base.join(BACKUP_DIR)
    }

    pub fn broken(&self) -> PathBuf {
        self.base.join(BROKEN_DIR)
    }

    fn staging(&self) -> PathBuf {
        self.base.join(format!("{}{}", STAGING_PREFIX, now_nanos()))
    }

    /// Read `metadata.json` from `dir`. `Ok(None)` if it does not exist.
    pub fn read_metadata(dir: &Path) -> Result<Option<SnapshotMetadata>, VectorError> {
        let path = dir.join(METADATA_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn write_metadata(dir: &Path, metadata: &SnapshotMetadata) -> Result<(), VectorError> {
        let path = dir.join(METADATA_FILE_NAME);
        let staging = dir.join(format!("{}.tmp", METADATA_FILE_NAME));
        fs::write(&staging, serde_json::to_vec(metadata)?)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    /// True if `dir` holds anything resembling a snapshot.
    pub fn has_data(dir: &Path) -> bool {
        dir.join(METADATA_FILE_NAME).exists() || dir.join(IDMAP_FILE_NAME).exists()
    }

    /// Remove staging directories left behind by an interrupted save.
    pub fn clean_staging(&self) -> Result<(), VectorError> {
        if !self.base.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.base)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                debug!(path = ?entry.path(), "Removing stale staging directory");
                fs::remove_dir_all(entry.path())?;
            }
        }
        Ok(())
    }

    /// Persist the committed state. Returns the number of records written.
    ///
    /// Only id map entries whose handle is present in `store` are written, so
    /// the snapshot is consistent even if the two drifted apart.
    pub fn write(
        &self,
        store: &dyn VectorStore,
        idmap: &IdMap,
        copy_on_write: bool,
    ) -> Result<u64, VectorError> {
        fs::create_dir_all(&self.base)?;
        if copy_on_write {
            let staging = self.staging();
            fs::create_dir_all(&staging)?;
            let count = match write_snapshot_files(&staging, store, idmap) {
                Ok(count) => count,
                Err(e) => {
                    let _ = fs::remove_dir_all(&staging);
                    return Err(e);
                }
            };

            let origin = self.origin();
            let backup = self.backup();
            if origin.exists() {
                if backup.exists() {
                    fs::remove_dir_all(&backup)?;
                }
                fs::rename(&origin, &backup)?;
            }
            fs::rename(&staging, &origin)?;
            Ok(count)
        } else {
            let origin = self.origin();
            fs::create_dir_all(&origin)?;
            Self::write_metadata(
                &origin,
                &SnapshotMetadata {
                    is_invalid: true,
                    index_count: 0,
                    dimension: store.dimension(),
                },
            )?;
            write_snapshot_files(&origin, store, idmap)
        }
    }

    /// Load the newest usable snapshot into `store`.
    ///
    /// Tries `origin`, then `backup`. A snapshot that fails to load is moved
    /// to `broken/` (or deleted when `history_limit` is 0) and the store is
    /// cleared. Returns `None` when nothing usable was found.
    pub fn load_into(
        &self,
        store: &mut dyn VectorStore,
        history_limit: usize,
    ) -> Result<Option<IdMap>, VectorError> {
        for dir in [self.origin(), self.backup()] {
            if !dir.exists() || !Self::has_data(&dir) {
                continue;
            }
            match try_load(&dir, store) {
                Ok(idmap) => {
                    info!(path = ?dir, records = idmap.len(), "Loaded index snapshot");
                    return Ok(Some(idmap));
                }
                Err(e) => {
                    warn!(path = ?dir, error = %e, "Snapshot unusable, quarantining");
                    store.clear()?;
                    self.quarantine(&dir, history_limit)?;
                }
            }
        }
        Ok(None)
    }

    fn quarantine(&self, dir: &Path, history_limit: usize) -> Result<(), VectorError> {
        if history_limit == 0 {
            fs::remove_dir_all(dir)?;
            return Ok(());
        }

        let broken = self.broken();
        fs::create_dir_all(&broken)?;
        fs::rename(dir, broken.join(format!("{:020}", now_nanos())))?;

        let mut generations: Vec<PathBuf> = fs::read_dir(&broken)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        generations.sort();
        while generations.len() > history_limit {
            let oldest = generations.remove(0);
            debug!(path = ?oldest, "Pruning quarantined snapshot");
            fs::remove_dir_all(&oldest)?;
        }
        Ok(())
    }
}

fn write_snapshot_files(
    dir: &Path,
    store: &dyn VectorStore,
    idmap: &IdMap,
) -> Result<u64, VectorError> {
    store.save(dir)?;
    let count = idmap.save_filtered(dir, |entry| store.contains(entry.handle))? as u64;
    SnapshotLayout::write_metadata(
        dir,
        &SnapshotMetadata {
            is_invalid: false,
            index_count: count,
            dimension: store.dimension(),
        },
    )?;
    Ok(count)
}

fn try_load(dir: &Path, store: &mut dyn VectorStore) -> Result<IdMap, VectorError> {
    let metadata = SnapshotLayout::read_metadata(dir)?
        .ok_or_else(|| VectorError::Corrupted("metadata missing".to_string()))?;
    if metadata.is_invalid {
        return Err(VectorError::Corrupted("snapshot marked invalid".to_string()));
    }
    if metadata.dimension != store.dimension() {
        return Err(VectorError::DimensionMismatch {
            expected: store.dimension(),
            actual: metadata.dimension,
        });
    }

    let idmap = IdMap::load(dir)?;
    if idmap.len() as u64 != metadata.index_count {
        return Err(VectorError::Corrupted(format!(
            "id map has {} entries, metadata says {}",
            idmap.len(),
            metadata.index_count
        )));
    }
    store.load(dir, &idmap.handles())?;
    Ok(idmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ann_types::DistanceType;
    use ann_vector::{HnswConfig, HnswStore};
    use tempfile::TempDir;

    fn store_with(records: &[(u64, [f32; 3])]) -> HnswStore {
        let mut store =
            HnswStore::new(HnswConfig::new(3).with_distance(DistanceType::L2)).unwrap();
        let batch: Vec<(u64, &[f32])> = records.iter().map(|(h, v)| (*h, &v[..])).collect();
        store.add_batch(&batch).unwrap();
        store
    }

    fn idmap_with(ids: &[(&str, u64)]) -> IdMap {
        let mut idmap = IdMap::new();
        for (id, handle) in ids {
            idmap.insert(id, *handle, 1);
        }
        idmap
    }

    fn empty_store() -> HnswStore {
        HnswStore::new(HnswConfig::new(3).with_distance(DistanceType::L2)).unwrap()
    }

    #[test]
    fn test_in_place_write_and_load() {
        let dir = TempDir::new().unwrap();
        let layout = SnapshotLayout::new(dir.path());
        let store = store_with(&[(0, [1.0, 0.0, 0.0]), (1, [0.0, 1.0, 0.0])]);
        let idmap = idmap_with(&[("a", 0), ("b", 1)]);

        assert_eq!(layout.write(&store, &idmap, false).unwrap(), 2);
        assert!(!layout.backup().exists());
        let meta = SnapshotLayout::read_metadata(&layout.origin()).unwrap().unwrap();
        assert!(!meta.is_invalid);
        assert_eq!(meta.index_count, 2);

        let mut loaded = empty_store();
        let idmap = layout.load_into(&mut loaded, 3).unwrap().unwrap();
        assert_eq!(idmap.len(), 2);
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn test_write_skips_entries_missing_from_store() {
        let dir = TempDir::new().unwrap();
        let layout = SnapshotLayout::new(dir.path());
        let store = store_with(&[(0, [1.0, 0.0, 0.0])]);
        let idmap = idmap_with(&[("a", 0), ("ghost", 7)]);

        assert_eq!(layout.write(&store, &idmap, false).unwrap(), 1);
    }

    #[test]
    fn test_copy_on_write_keeps_backup() {
        let dir = TempDir::new().unwrap();
        let layout = SnapshotLayout::new(dir.path());

        let first = store_with(&[(0, [1.0, 0.0, 0.0])]);
        layout.write(&first, &idmap_with(&[("a", 0)]), true).unwrap();
        assert!(!layout.backup().exists());

        let second = store_with(&[(0, [1.0, 0.0, 0.0]), (1, [0.0, 1.0, 0.0])]);
        layout
            .write(&second, &idmap_with(&[("a", 0), ("b", 1)]), true)
            .unwrap();

        let origin = SnapshotLayout::read_metadata(&layout.origin()).unwrap().unwrap();
        let backup = SnapshotLayout::read_metadata(&layout.backup()).unwrap().unwrap();
        assert_eq!(origin.index_count, 2);
        assert_eq!(backup.index_count, 1);

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .unwrap()
                    .file_name()
                    .to_string_lossy()
                    .starts_with(STAGING_PREFIX)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_invalid_origin_falls_back_to_backup() {
        let dir = TempDir::new().unwrap();
        let layout = SnapshotLayout::new(dir.path());
        let store = store_with(&[(0, [1.0, 0.0, 0.0])]);
        layout.write(&store, &idmap_with(&[("a", 0)]), true).unwrap();
        layout.write(&store, &idmap_with(&[("a", 0)]), true).unwrap();

        SnapshotLayout::write_metadata(
            &layout.origin(),
            &SnapshotMetadata {
                is_invalid: true,
                index_count: 1,
                dimension: 3,
            },
        )
        .unwrap();

        let mut loaded = empty_store();
        let idmap = layout.load_into(&mut loaded, 3).unwrap().unwrap();
        assert!(idmap.contains("a"));
        assert!(!layout.origin().exists());
        assert_eq!(fs::read_dir(layout.broken()).unwrap().count(), 1);
    }

    #[test]
    fn test_dimension_mismatch_is_quarantined() {
        let dir = TempDir::new().unwrap();
        let layout = SnapshotLayout::new(dir.path());
        let store = store_with(&[(0, [1.0, 0.0, 0.0])]);
        layout.write(&store, &idmap_with(&[("a", 0)]), false).unwrap();

        let mut wider =
            HnswStore::new(HnswConfig::new(4).with_distance(DistanceType::L2)).unwrap();
        assert!(layout.load_into(&mut wider, 0).unwrap().is_none());
        assert!(!layout.origin().exists());
        assert!(!layout.broken().exists());
    }

    #[test]
    fn test_quarantine_history_is_bounded() {
        let dir = TempDir::new().unwrap();
        let layout = SnapshotLayout::new(dir.path());

        for _ in 0..4 {
            let origin = layout.origin();
            fs::create_dir_all(&origin).unwrap();
            fs::write(origin.join(IDMAP_FILE_NAME), b"not json").unwrap();
            let mut store = empty_store();
            assert!(layout.load_into(&mut store, 2).unwrap().is_none());
        }
        assert_eq!(fs::read_dir(layout.broken()).unwrap().count(), 2);
    }

    #[test]
    fn test_clean_staging() {
        let dir = TempDir::new().unwrap();
        let layout = SnapshotLayout::new(dir.path());
        fs::create_dir_all(dir.path().join("tmp-123")).unwrap();
        fs::create_dir_all(layout.origin()).unwrap();

        layout.clean_staging().unwrap();
        assert!(!dir.path().join("tmp-123").exists());
        assert!(layout.origin().exists());
    }

    #[test]
    fn test_empty_dir_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let layout = SnapshotLayout::new(dir.path());
        let mut store = empty_store();
        assert!(layout.load_into(&mut store, 3).unwrap().is_none());
    }
}
