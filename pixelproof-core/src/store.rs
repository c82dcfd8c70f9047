//! Persistence of detections.
//!
//! A detection is stored as one [`DetectionRecord`]: the result, its full
//! block list and the sealed tile payloads. Records are written once by a
//! single insert and never updated, so readers never observe a result
//! without its blocks. Deleting a record removes all three together.

use std::io::Write;
use std::path::{Path, PathBuf};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{PixelProofError, Result};
use crate::record::{DetectionResult, TamperedBlock};

/// Sealed reconstruction payload for one tile. Opaque outside the
/// recovery store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedTile {
    pub block_index: u32,
    pub payload: Vec<u8>,
}

/// Everything persisted for one detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub result: DetectionResult,
    pub blocks: Vec<TamperedBlock>,
    pub sealed: Vec<SealedTile>,
}

impl DetectionRecord {
    pub fn id(&self) -> Uuid {
        self.result.id
    }

    pub fn sealed_tile(&self, block_index: u32) -> Option<&SealedTile> {
        self.sealed.iter().find(|t| t.block_index == block_index)
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes)
            .map_err(|e| PixelProofError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| PixelProofError::Serialization(e.to_string()))
    }
}

/// Create/read/delete access to detection records.
pub trait DetectionStore: Send + Sync {
    /// Persist a new record. Fails with [`PixelProofError::Storage`] if the
    /// id already exists.
    fn insert(&self, record: DetectionRecord) -> Result<()>;

    fn get(&self, id: &Uuid) -> Result<Option<DetectionRecord>>;

    /// Remove a record with its blocks and payloads. Returns whether it
    /// existed.
    fn delete(&self, id: &Uuid) -> Result<bool>;

    /// All stored ids, sorted.
    fn ids(&self) -> Result<Vec<Uuid>>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemoryDetectionStore {
    records: DashMap<Uuid, DetectionRecord>,
}

impl MemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DetectionStore for MemoryDetectionStore {
    fn insert(&self, record: DetectionRecord) -> Result<()> {
        match self.records.entry(record.id()) {
            Entry::Occupied(entry) => Err(PixelProofError::Storage(format!(
                "detection {} already exists",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    fn get(&self, id: &Uuid) -> Result<Option<DetectionRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    fn delete(&self, id: &Uuid) -> Result<bool> {
        Ok(self.records.remove(id).is_some())
    }

    fn ids(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.records.iter().map(|r| *r.key()).collect();
        ids.sort();
        Ok(ids)
    }
}

/// One CBOR file per detection, `<dir>/<id>.cbor`.
///
/// Files are written to a temporary file in the same directory and then
/// linked into place without overwriting, so a record is either fully
/// present or absent.
#[derive(Debug, Clone)]
pub struct FileDetectionStore {
    dir: PathBuf,
}

impl FileDetectionStore {
    const EXTENSION: &'static str = "cbor";

    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.dir.join(format!("{id}.{}", Self::EXTENSION))
    }
}

impl DetectionStore for FileDetectionStore {
    fn insert(&self, record: DetectionRecord) -> Result<()> {
        let path = self.path_for(&record.id());
        let bytes = record.to_cbor()?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                PixelProofError::Storage(format!("detection {} already exists", record.id()))
            } else {
                PixelProofError::Storage(e.error.to_string())
            }
        })?;

        tracing::debug!(id = %record.id(), bytes = bytes.len(), "Detection record written");
        Ok(())
    }

    fn get(&self, id: &Uuid) -> Result<Option<DetectionRecord>> {
        match std::fs::read(self.path_for(id)) {
            Ok(bytes) => DetectionRecord::from_cbor(&bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: &Uuid) -> Result<bool> {
        match std::fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn ids(&self) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BoundingBox, DetectionParams, DetectionStrategy};
    use chrono::Utc;

    fn record() -> DetectionRecord {
        let block = TamperedBlock {
            block_index: 1,
            bbox: BoundingBox::new(64, 0, 64, 64),
            is_tampered: true,
            difference_ratio: 0.42,
            has_original_data: true,
        };
        DetectionRecord {
            result: DetectionResult {
                id: Uuid::new_v4(),
                strategy: DetectionStrategy::Compare,
                reference_image_id: Some("ref.png".into()),
                candidate_image_id: None,
                is_tampered: true,
                tamper_ratio: 0.25,
                confidence: None,
                regions: vec![],
                visualization: None,
                params: DetectionParams::Compare {
                    tile_size: 64,
                    threshold: 0.1,
                },
                created_at: Utc::now(),
            },
            blocks: vec![block],
            sealed: vec![SealedTile {
                block_index: 1,
                payload: vec![1, 2, 3],
            }],
        }
    }

    fn exercise(store: &dyn DetectionStore) {
        let rec = record();
        let id = rec.id();
        store.insert(rec.clone()).unwrap();

        assert_eq!(store.get(&id).unwrap(), Some(rec.clone()));
        assert_eq!(store.ids().unwrap(), vec![id]);

        let dup = store.insert(rec).unwrap_err();
        assert!(matches!(dup, PixelProofError::Storage(_)));

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert_eq!(store.get(&id).unwrap(), None);
        assert!(store.ids().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryDetectionStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileDetectionStore::open(dir.path().join("detections")).unwrap());
    }

    #[test]
    fn test_file_store_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileDetectionStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("garbage.cbor"), b"xx").unwrap();
        assert!(store.ids().unwrap().is_empty());
    }

    #[test]
    fn test_sealed_tile_lookup() {
        let rec = record();
        assert!(rec.sealed_tile(1).is_some());
        assert!(rec.sealed_tile(0).is_none());
    }
}
