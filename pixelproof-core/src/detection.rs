//! Detection orchestrator.
//!
//! [`DetectionService`] is the single entry point callers use. It runs one
//! strategy per call, normalizes the resulting mask, renders a
//! visualization on a best-effort basis, and persists the canonical
//! [`DetectionResult`] (plus, for block comparisons, the tile list and
//! sealed originals) in one store insert before returning.
//!
//! Expected degradations (placeholder substitution, failed rendering) never
//! fail a call; they are reported in [`DetectionOutcome::diagnostics`].

use std::sync::Arc;

use chrono::Utc;
use image::RgbImage;
use tracing::{info, warn};
use uuid::Uuid;

use crate::compare::BlockComparator;
use crate::config::{validate_confidence_threshold, DetectionConfig};
use crate::detector::{select_detector, PlaceholderDetector, TamperDetector};
use crate::error::{PixelProofError, Result};
use crate::mask::{normalize, Mask};
use crate::record::{
    round_ratio, BlockInfo, DetectionOutcome, DetectionParams, DetectionResult,
    DetectionStrategy, Diagnostic, RestoredBlock, TamperRegion, TamperedBlock,
};
use crate::recovery::{RecoveryStore, SealingKey, TileCipher, XChaChaTileCipher};
use crate::regions::regions_from_mask;
use crate::store::{DetectionRecord, DetectionStore, MemoryDetectionStore, SealedTile};
use crate::visualize::{render_regions, ArtifactSink};
use crate::watermark::{self, WatermarkKey};

/// A decoded image plus an optional caller-supplied identifier.
#[derive(Debug, Clone, Copy)]
pub struct ImageInput<'a> {
    pub image: &'a RgbImage,
    pub id: Option<&'a str>,
}

impl<'a> ImageInput<'a> {
    pub fn new(image: &'a RgbImage) -> Self {
        Self { image, id: None }
    }

    /// Attach an identifier recorded in the result.
    pub fn with_id(mut self, id: &'a str) -> Self {
        self.id = Some(id);
        self
    }
}

impl<'a> From<&'a RgbImage> for ImageInput<'a> {
    fn from(image: &'a RgbImage) -> Self {
        Self::new(image)
    }
}

/// Builder for [`DetectionService`].
#[derive(Default)]
pub struct DetectionServiceBuilder {
    config: Option<DetectionConfig>,
    detector: Option<Arc<dyn TamperDetector>>,
    store: Option<Arc<dyn DetectionStore>>,
    cipher: Option<Arc<dyn TileCipher>>,
    artifacts: Option<Arc<dyn ArtifactSink>>,
}

impl DetectionServiceBuilder {
    /// Use `config` instead of [`DetectionConfig::default`].
    pub fn config(mut self, config: DetectionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Learned detector backend. The placeholder is used when absent or
    /// unavailable.
    pub fn detector(mut self, detector: Arc<dyn TamperDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Persistence backend (default: in-memory).
    pub fn store(mut self, store: Arc<dyn DetectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Cipher sealing captured tiles (default: XChaCha20-Poly1305 with a
    /// random per-process key).
    pub fn cipher(mut self, cipher: Arc<dyn TileCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Destination for rendered visualizations. Rendering is skipped
    /// without one.
    pub fn artifacts(mut self, sink: Arc<dyn ArtifactSink>) -> Self {
        self.artifacts = Some(sink);
        self
    }

    pub fn build(self) -> Result<DetectionService> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let store: Arc<dyn DetectionStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryDetectionStore::new()),
        };
        let cipher: Arc<dyn TileCipher> = match self.cipher {
            Some(cipher) => cipher,
            None => {
                warn!("No tile cipher configured, sealing with an ephemeral key");
                Arc::new(XChaChaTileCipher::new(SealingKey::generate()))
            }
        };

        Ok(DetectionService {
            detector: select_detector(self.detector),
            recovery: RecoveryStore::new(store.clone(), cipher),
            store,
            artifacts: self.artifacts,
            config,
        })
    }
}

/// Runs detections and serves recovery.
pub struct DetectionService {
    config: DetectionConfig,
    detector: Arc<dyn TamperDetector>,
    store: Arc<dyn DetectionStore>,
    recovery: RecoveryStore,
    artifacts: Option<Arc<dyn ArtifactSink>>,
}

impl DetectionService {
    pub fn builder() -> DetectionServiceBuilder {
        DetectionServiceBuilder::default()
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Name of the detector selected at construction.
    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Embed the key's watermark into a copy of `image`.
    pub fn embed_watermark(&self, image: &RgbImage, key: &WatermarkKey) -> RgbImage {
        watermark::embed(image, key, self.config.lsb_channel)
    }

    /// Check `image` against the key's watermark.
    pub fn verify_watermark(
        &self,
        image: ImageInput<'_>,
        key: &WatermarkKey,
    ) -> Result<DetectionOutcome> {
        let channel = self.config.lsb_channel;
        let score = watermark::extract_and_score(image.image, key, channel);
        let regions = regions_from_mask(&score.mask, self.config.region_cell, None);

        let result = DetectionResult {
            id: Uuid::new_v4(),
            strategy: DetectionStrategy::Lsb,
            reference_image_id: None,
            candidate_image_id: image.id.map(str::to_owned),
            is_tampered: score.is_tampered(),
            tamper_ratio: score.ratio,
            confidence: None,
            regions,
            visualization: None,
            params: DetectionParams::Lsb {
                key_digest: key.digest_hex(),
                channel,
            },
            created_at: Utc::now(),
        };

        self.finish(result, image.image, Vec::new(), Vec::new(), Vec::new())
    }

    /// Compare `candidate` tile by tile against the trusted `reference`.
    ///
    /// `tile_size` and `threshold` default to the configured values. The
    /// reference pixels of every tampered tile are sealed for recovery.
    pub fn compare_blocks(
        &self,
        reference: ImageInput<'_>,
        candidate: ImageInput<'_>,
        tile_size: Option<u32>,
        threshold: Option<f64>,
    ) -> Result<DetectionOutcome> {
        let comparator = BlockComparator::new(
            tile_size.unwrap_or(self.config.tile_size),
            threshold.unwrap_or(self.config.block_threshold),
        )?;

        let comparison = comparator.compare(reference.image, candidate.image);
        let id = Uuid::new_v4();

        let mut session = self.recovery.begin(id);
        let mut blocks = Vec::with_capacity(comparison.tile_count());
        let mut regions = Vec::new();

        for outcome in &comparison.blocks {
            if let Some(original) = &outcome.original {
                session.capture(outcome.index, original).map_err(|e| {
                    PixelProofError::Processing(format!(
                        "capturing block {} failed: {e}",
                        outcome.index
                    ))
                })?;
            }
            if outcome.is_tampered {
                regions.push(TamperRegion {
                    bbox: outcome.bbox,
                    confidence: Some(round_ratio(outcome.difference_ratio)),
                });
            }
            blocks.push(TamperedBlock {
                block_index: outcome.index,
                bbox: outcome.bbox,
                is_tampered: outcome.is_tampered,
                difference_ratio: round_ratio(outcome.difference_ratio),
                has_original_data: outcome.original.is_some(),
            });
        }

        let result = DetectionResult {
            id,
            strategy: DetectionStrategy::Compare,
            reference_image_id: reference.id.map(str::to_owned),
            candidate_image_id: candidate.id.map(str::to_owned),
            is_tampered: comparison.is_tampered(),
            tamper_ratio: comparison.ratio,
            confidence: None,
            regions,
            visualization: None,
            params: DetectionParams::Compare {
                tile_size: comparator.tile_size(),
                threshold: comparator.threshold(),
            },
            created_at: Utc::now(),
        };

        let sealed = session.finish();
        self.finish(result, candidate.image, blocks, sealed, Vec::new())
    }

    /// Run the learned detector.
    ///
    /// The result is tampered iff the detector's confidence reaches
    /// `confidence_threshold` (default: configured value).
    pub fn detect_with_model(
        &self,
        image: ImageInput<'_>,
        confidence_threshold: Option<f64>,
    ) -> Result<DetectionOutcome> {
        let threshold = confidence_threshold.unwrap_or(self.config.confidence_threshold);
        validate_confidence_threshold(threshold)?;

        let mut diagnostics = Vec::new();
        let (output, backend) = match self.detector.detect(image.image, threshold as f32) {
            Ok(output) => (output, self.detector.name().to_owned()),
            Err(PixelProofError::DetectorUnavailable(reason)) => {
                warn!(
                    backend = self.detector.name(),
                    %reason,
                    "Detector unavailable at call time, using placeholder"
                );
                diagnostics.push(Diagnostic::DetectorSubstituted { reason });
                let placeholder = PlaceholderDetector;
                (
                    placeholder.detect(image.image, threshold as f32)?,
                    placeholder.name().to_owned(),
                )
            }
            Err(e) => return Err(e),
        };

        let (width, height) = image.image.dimensions();
        let mask = match &output.mask {
            Some(raw) => normalize(raw, width, height)?,
            None => Mask::new(width, height),
        };

        let confidence = round_ratio(f64::from(output.confidence).clamp(0.0, 1.0));
        let regions = regions_from_mask(&mask, self.config.region_cell, Some(confidence));

        let result = DetectionResult {
            id: Uuid::new_v4(),
            strategy: DetectionStrategy::Model,
            reference_image_id: None,
            candidate_image_id: image.id.map(str::to_owned),
            is_tampered: confidence >= threshold,
            tamper_ratio: mask.flagged_ratio(),
            confidence: Some(confidence),
            regions,
            visualization: None,
            params: DetectionParams::Model {
                confidence_threshold: threshold,
                backend,
            },
            created_at: Utc::now(),
        };

        self.finish(result, image.image, Vec::new(), Vec::new(), diagnostics)
    }

    /// Tampered tiles of a compare detection and whether each can be restored.
    pub fn list_recoverable_blocks(&self, detection_id: Uuid) -> Result<Vec<BlockInfo>> {
        self.recovery.list_available(detection_id)
    }

    /// Decrypt the original pixels of the requested tiles (all tampered
    /// tiles when `block_indices` is empty).
    pub fn restore_blocks(
        &self,
        detection_id: Uuid,
        block_indices: &[u32],
    ) -> Result<Vec<RestoredBlock>> {
        self.recovery.restore(detection_id, block_indices)
    }

    /// Load a stored detection with its tile list.
    pub fn get_detection(&self, detection_id: Uuid) -> Result<DetectionOutcome> {
        let record = self
            .store
            .get(&detection_id)?
            .ok_or_else(|| PixelProofError::NotFound(detection_id.to_string()))?;
        Ok(DetectionOutcome {
            result: record.result,
            blocks: record.blocks,
            diagnostics: Vec::new(),
        })
    }

    /// Delete a detection together with its tiles and sealed originals.
    pub fn delete_detection(&self, detection_id: Uuid) -> Result<bool> {
        let deleted = self.store.delete(&detection_id)?;
        if deleted {
            info!(%detection_id, "Detection deleted");
        }
        Ok(deleted)
    }

    /// Render, persist and package a finished detection.
    fn finish(
        &self,
        mut result: DetectionResult,
        subject: &RgbImage,
        blocks: Vec<TamperedBlock>,
        sealed: Vec<SealedTile>,
        mut diagnostics: Vec<Diagnostic>,
    ) -> Result<DetectionOutcome> {
        if result.is_tampered && self.config.visualize {
            if let Some(sink) = &self.artifacts {
                match render_regions(subject, &result.regions)
                    .and_then(|rendered| sink.store(result.id, &rendered))
                {
                    Ok(reference) => result.visualization = Some(reference),
                    Err(e) => {
                        warn!(id = %result.id, error = %e, "Visualization skipped");
                        diagnostics.push(Diagnostic::VisualizationFailed {
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        self.store.insert(DetectionRecord {
            result: result.clone(),
            blocks: blocks.clone(),
            sealed,
        })?;

        info!(
            id = %result.id,
            strategy = %result.strategy,
            tampered = result.is_tampered,
            ratio = result.tamper_ratio,
            regions = result.regions.len(),
            "Detection complete"
        );

        Ok(DetectionOutcome {
            result,
            blocks,
            diagnostics,
        })
    }
}
