//! Detection records handed back to callers and persisted by the store.
//!
//! A [`DetectionResult`] is produced once per detection call and never
//! modified afterwards. For the block strategy it is accompanied by the full
//! ordered list of [`TamperedBlock`]s; both are owned by the detection and
//! deleted with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::watermark::LsbChannel;

/// Detection strategy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStrategy {
    /// Keyed LSB watermark verification
    Lsb,
    /// Tile-by-tile comparison against a reference image
    Compare,
    /// Learned detector behind the adapter boundary
    Model,
}

impl std::fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lsb => write!(f, "lsb"),
            Self::Compare => write!(f, "compare"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Axis-aligned box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// True when the box is non-empty and lies entirely inside a
    /// `width x height` image.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= height)
    }
}

/// A localized tampered area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperRegion {
    pub bbox: BoundingBox,
    /// Meaningful for the `model` and `compare` strategies only.
    pub confidence: Option<f64>,
}

/// Parameters a detection ran with. The watermark key is only ever recorded
/// as its digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DetectionParams {
    Lsb {
        key_digest: String,
        channel: LsbChannel,
    },
    Compare {
        tile_size: u32,
        threshold: f64,
    },
    Model {
        confidence_threshold: f64,
        backend: String,
    },
}

/// Canonical verdict of one detection call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub id: Uuid,
    pub strategy: DetectionStrategy,
    /// Reference image identifier, `compare` only.
    pub reference_image_id: Option<String>,
    pub candidate_image_id: Option<String>,
    pub is_tampered: bool,
    /// Fraction of pixels (lsb, model) or tiles (compare) flagged, 4 decimals.
    pub tamper_ratio: f64,
    /// Detector confidence, `model` only.
    pub confidence: Option<f64>,
    pub regions: Vec<TamperRegion>,
    /// Reference returned by the artifact sink, absent when rendering was
    /// skipped or failed.
    pub visualization: Option<String>,
    pub params: DetectionParams,
    pub created_at: DateTime<Utc>,
}

/// One tile of a block comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamperedBlock {
    /// Row-major index over the tile grid.
    pub block_index: u32,
    pub bbox: BoundingBox,
    pub is_tampered: bool,
    pub difference_ratio: f64,
    /// Whether a sealed copy of the reference tile was captured.
    pub has_original_data: bool,
}

/// Listing entry for recoverable blocks; never carries pixel data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub block_index: u32,
    pub bbox: BoundingBox,
    pub has_original_data: bool,
}

impl From<&TamperedBlock> for BlockInfo {
    fn from(block: &TamperedBlock) -> Self {
        Self {
            block_index: block.block_index,
            bbox: block.bbox,
            has_original_data: block.has_original_data,
        }
    }
}

/// Outcome of restoring a single requested block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoredBlock {
    pub block_index: u32,
    /// Absent when the index is not part of the detection's tile grid.
    pub bbox: Option<BoundingBox>,
    /// PNG-encoded original tile, absent when nothing was captured.
    pub block_data: Option<Vec<u8>>,
}

impl RestoredBlock {
    pub fn is_available(&self) -> bool {
        self.block_data.is_some()
    }
}

/// Operational note about an expected degradation during a detection call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// The learned backend could not run; the placeholder answered instead.
    DetectorSubstituted { reason: String },
    /// Rendering or storing the visualization failed.
    VisualizationFailed { reason: String },
}

/// Everything a detection call returns.
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub result: DetectionResult,
    /// Full tile list for `compare`, empty otherwise.
    pub blocks: Vec<TamperedBlock>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DetectionOutcome {
    pub fn tampered_blocks(&self) -> impl Iterator<Item = &TamperedBlock> {
        self.blocks.iter().filter(|b| b.is_tampered)
    }
}

/// Round a ratio to 4 decimal places.
pub fn round_ratio(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Smallest ratio a non-empty count can report.
pub const MIN_FLAGGED_RATIO: f64 = 0.0001;

/// `flagged / total` rounded to 4 decimals, never rounded down to zero while
/// anything is flagged.
pub fn flagged_ratio(flagged: u64, total: u64) -> f64 {
    if flagged == 0 || total == 0 {
        return 0.0;
    }
    round_ratio(flagged as f64 / total as f64).max(MIN_FLAGGED_RATIO)
}
