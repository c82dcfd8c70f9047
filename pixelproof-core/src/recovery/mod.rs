//! Region recovery for block-compare detections.
//!
//! During a comparison, the reference pixels of every tampered tile are
//! PNG-encoded and sealed into a [`CaptureSession`]. The sealed payloads are
//! committed together with the detection record, and the [`RecoveryStore`]
//! later replays them byte-for-byte; nothing is ever re-derived.

mod cipher;

pub use cipher::{
    tile_aad, SealingKey, TileCipher, XChaChaTileCipher, KEY_SIZE, MIN_SALT_SIZE, NONCE_SIZE,
};

use std::io::Cursor;
use std::sync::Arc;

use image::{imageops, ImageFormat, RgbImage};
use uuid::Uuid;

use crate::error::{PixelProofError, Result};
use crate::record::{BlockInfo, DetectionStrategy, RestoredBlock};
use crate::store::{DetectionRecord, DetectionStore, SealedTile};

/// Lossless encoding of a tile.
pub fn encode_tile(tile: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    tile.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Decode a tile produced by [`encode_tile`].
pub fn decode_tile(bytes: &[u8]) -> Result<RgbImage> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgb8())
}

/// Sealed tiles staged for one detection, not yet persisted.
pub struct CaptureSession<'a> {
    detection_id: Uuid,
    cipher: &'a dyn TileCipher,
    sealed: Vec<SealedTile>,
}

impl CaptureSession<'_> {
    pub fn detection_id(&self) -> Uuid {
        self.detection_id
    }

    /// Encode and seal the original pixels of `block_index`.
    pub fn capture(&mut self, block_index: u32, original: &RgbImage) -> Result<()> {
        let encoded = encode_tile(original)?;
        let payload = self
            .cipher
            .seal(&tile_aad(self.detection_id, block_index), &encoded)?;
        self.sealed.push(SealedTile {
            block_index,
            payload,
        });
        Ok(())
    }

    pub fn captured(&self) -> impl Iterator<Item = u32> + '_ {
        self.sealed.iter().map(|t| t.block_index)
    }

    pub fn len(&self) -> usize {
        self.sealed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty()
    }

    /// Hand the sealed payloads over for the detection record.
    pub fn finish(self) -> Vec<SealedTile> {
        self.sealed
    }
}

/// Serves listing and restoration of captured tiles.
pub struct RecoveryStore {
    store: Arc<dyn DetectionStore>,
    cipher: Arc<dyn TileCipher>,
}

impl RecoveryStore {
    pub fn new(store: Arc<dyn DetectionStore>, cipher: Arc<dyn TileCipher>) -> Self {
        Self { store, cipher }
    }

    /// Start staging captures for a new detection.
    pub fn begin(&self, detection_id: Uuid) -> CaptureSession<'_> {
        CaptureSession {
            detection_id,
            cipher: self.cipher.as_ref(),
            sealed: Vec::new(),
        }
    }

    /// Tampered tiles of a compare detection, with whether a payload exists.
    /// Nothing is decrypted.
    pub fn list_available(&self, detection_id: Uuid) -> Result<Vec<BlockInfo>> {
        let record = self.load_compare_record(detection_id)?;
        Ok(record
            .blocks
            .iter()
            .filter(|b| b.is_tampered)
            .map(|b| BlockInfo {
                has_original_data: record.sealed_tile(b.block_index).is_some(),
                ..BlockInfo::from(b)
            })
            .collect())
    }

    /// Decrypt the requested tiles.
    ///
    /// An empty `indices` restores every tampered tile. Indices without a
    /// payload come back with `block_data: None`; order and duplicates of
    /// the request are preserved.
    pub fn restore(&self, detection_id: Uuid, indices: &[u32]) -> Result<Vec<RestoredBlock>> {
        let record = self.load_compare_record(detection_id)?;

        let requested: Vec<u32> = if indices.is_empty() {
            record
                .blocks
                .iter()
                .filter(|b| b.is_tampered)
                .map(|b| b.block_index)
                .collect()
        } else {
            indices.to_vec()
        };

        let mut restored = Vec::with_capacity(requested.len());
        for block_index in requested {
            let bbox = record
                .blocks
                .iter()
                .find(|b| b.block_index == block_index)
                .map(|b| b.bbox);

            let block_data = match record.sealed_tile(block_index) {
                Some(tile) => Some(
                    self.cipher
                        .open(&tile_aad(detection_id, block_index), &tile.payload)?,
                ),
                None => {
                    let missing = PixelProofError::RecoveryDataMissing { block_index };
                    tracing::warn!(%detection_id, "{missing}");
                    None
                }
            };

            restored.push(RestoredBlock {
                block_index,
                bbox,
                block_data,
            });
        }

        tracing::info!(
            %detection_id,
            requested = restored.len(),
            available = restored.iter().filter(|b| b.is_available()).count(),
            "Blocks restored"
        );
        Ok(restored)
    }

    fn load_compare_record(&self, detection_id: Uuid) -> Result<DetectionRecord> {
        let record = self
            .store
            .get(&detection_id)?
            .ok_or_else(|| PixelProofError::NotFound(detection_id.to_string()))?;
        if record.result.strategy != DetectionStrategy::Compare {
            return Err(PixelProofError::invalid(format!(
                "detection {detection_id} used the {} strategy; only compare detections are recoverable",
                record.result.strategy
            )));
        }
        Ok(record)
    }
}

/// Paste restored tiles onto a copy of `candidate`.
///
/// Blocks without data are skipped. A tile whose box or decoded size does
/// not fit the candidate is a [`PixelProofError::DimensionMismatch`].
pub fn apply_restored_blocks(candidate: &RgbImage, restored: &[RestoredBlock]) -> Result<RgbImage> {
    let mut repaired = candidate.clone();
    let (width, height) = candidate.dimensions();

    for block in restored {
        let (Some(bbox), Some(data)) = (block.bbox, block.block_data.as_deref()) else {
            continue;
        };
        let tile = decode_tile(data)?;
        if tile.dimensions() != (bbox.width, bbox.height) || !bbox.fits_within(width, height) {
            return Err(PixelProofError::DimensionMismatch(format!(
                "block {} ({}x{} at {}, {}) does not fit a {}x{} image",
                block.block_index, bbox.width, bbox.height, bbox.x, bbox.y, width, height
            )));
        }
        imageops::replace(&mut repaired, &tile, i64::from(bbox.x), i64::from(bbox.y));
    }

    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{BoundingBox, DetectionParams, DetectionResult, TamperedBlock};
    use crate::store::MemoryDetectionStore;
    use chrono::Utc;
    use image::Rgb;

    fn recovery() -> (RecoveryStore, Arc<MemoryDetectionStore>) {
        let store = Arc::new(MemoryDetectionStore::new());
        let cipher = Arc::new(XChaChaTileCipher::new(SealingKey::generate()));
        (RecoveryStore::new(store.clone(), cipher), store)
    }

    fn result(id: Uuid, strategy: DetectionStrategy) -> DetectionResult {
        DetectionResult {
            id,
            strategy,
            reference_image_id: None,
            candidate_image_id: None,
            is_tampered: true,
            tamper_ratio: 0.5,
            confidence: None,
            regions: vec![],
            visualization: None,
            params: DetectionParams::Compare {
                tile_size: 2,
                threshold: 0.1,
            },
            created_at: Utc::now(),
        }
    }

    fn block(index: u32, x: u32, tampered: bool) -> TamperedBlock {
        TamperedBlock {
            block_index: index,
            bbox: BoundingBox::new(x, 0, 2, 2),
            is_tampered: tampered,
            difference_ratio: if tampered { 0.9 } else { 0.0 },
            has_original_data: false,
        }
    }

    /// 6x2 detection, tiles 0..3; tiles 1 and 2 tampered, only 1 captured.
    fn seeded(recovery: &RecoveryStore, store: &MemoryDetectionStore) -> (Uuid, RgbImage) {
        let id = Uuid::new_v4();
        let tile = RgbImage::from_pixel(2, 2, Rgb([10, 20, 30]));
        let mut session = recovery.begin(id);
        session.capture(1, &tile).unwrap();

        let mut blocks = vec![block(0, 0, false), block(1, 2, true), block(2, 4, true)];
        blocks[1].has_original_data = true;
        store
            .insert(DetectionRecord {
                result: result(id, DetectionStrategy::Compare),
                blocks,
                sealed: session.finish(),
            })
            .unwrap();
        (id, tile)
    }

    #[test]
    fn test_list_available_reports_payload_presence() {
        let (recovery, store) = recovery();
        let (id, _) = seeded(&recovery, &store);
        let listed = recovery.list_available(id).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!((listed[0].block_index, listed[0].has_original_data), (1, true));
        assert_eq!((listed[1].block_index, listed[1].has_original_data), (2, false));
    }

    #[test]
    fn test_restore_is_byte_exact_and_marks_missing() {
        let (recovery, store) = recovery();
        let (id, tile) = seeded(&recovery, &store);

        let restored = recovery.restore(id, &[1, 2, 3]).unwrap();
        assert_eq!(restored.len(), 3);
        let expected = encode_tile(&tile).unwrap();
        assert_eq!(restored[0].block_data.as_deref(), Some(expected.as_slice()));
        assert!(!restored[1].is_available());
        assert_eq!(restored[1].bbox, Some(BoundingBox::new(4, 0, 2, 2)));
        assert!(!restored[2].is_available());
        assert_eq!(restored[2].bbox, None);
    }

    #[test]
    fn test_restore_all_when_no_indices() {
        let (recovery, store) = recovery();
        let (id, _) = seeded(&recovery, &store);
        let restored = recovery.restore(id, &[]).unwrap();
        let indices: Vec<u32> = restored.iter().map(|b| b.block_index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_unknown_detection() {
        let (recovery, _) = recovery();
        assert!(matches!(
            recovery.restore(Uuid::new_v4(), &[0]),
            Err(PixelProofError::NotFound(_))
        ));
    }

    #[test]
    fn test_non_compare_detection_rejected() {
        let (recovery, store) = recovery();
        let id = Uuid::new_v4();
        store
            .insert(DetectionRecord {
                result: result(id, DetectionStrategy::Lsb),
                blocks: vec![],
                sealed: vec![],
            })
            .unwrap();
        assert!(matches!(
            recovery.list_available(id),
            Err(PixelProofError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_wrong_cipher_fails_restore() {
        let (recovery, store) = recovery();
        let (id, _) = seeded(&recovery, &store);
        let other = RecoveryStore::new(
            store,
            Arc::new(XChaChaTileCipher::new(SealingKey::generate())),
        );
        assert!(matches!(
            other.restore(id, &[1]),
            Err(PixelProofError::Crypto(_))
        ));
    }

    #[test]
    fn test_apply_restored_blocks() {
        let (recovery, store) = recovery();
        let (id, tile) = seeded(&recovery, &store);
        let candidate = RgbImage::from_pixel(6, 2, Rgb([255, 255, 255]));

        let restored = recovery.restore(id, &[]).unwrap();
        let repaired = apply_restored_blocks(&candidate, &restored).unwrap();

        assert_eq!(repaired.get_pixel(2, 0), tile.get_pixel(0, 0));
        assert_eq!(repaired.get_pixel(3, 1), tile.get_pixel(1, 1));
        // Tile 2 had no payload and is left as-is.
        assert_eq!(*repaired.get_pixel(4, 0), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_apply_rejects_out_of_bounds_tile() {
        let restored = vec![RestoredBlock {
            block_index: 0,
            bbox: Some(BoundingBox::new(4, 0, 2, 2)),
            block_data: Some(encode_tile(&RgbImage::new(2, 2)).unwrap()),
        }];
        let err = apply_restored_blocks(&RgbImage::new(4, 4), &restored).unwrap_err();
        assert!(matches!(err, PixelProofError::DimensionMismatch(_)));
    }
}
