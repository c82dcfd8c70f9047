//! Detection configuration
//!
//! Loaded from environment variables with sensible defaults. Unparsable
//! values fall back to the default; out-of-range values are only rejected
//! by [`DetectionConfig::validate`].

use crate::compare::{DEFAULT_BLOCK_THRESHOLD, DEFAULT_TILE_SIZE};
use crate::error::{PixelProofError, Result};
use crate::regions::DEFAULT_REGION_CELL;
use crate::watermark::LsbChannel;

/// Default confidence threshold for the learned detector.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Detection defaults used when a call does not override them.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionConfig {
    /// Tile edge for block comparison (default: 64)
    pub tile_size: u32,
    /// Per-tile difference threshold (default: 0.1)
    pub block_threshold: f64,
    /// Learned detector confidence threshold (default: 0.5)
    pub confidence_threshold: f64,
    /// Cell edge used to group mask pixels into regions (default: 32)
    pub region_cell: u32,
    /// Channel carrying the watermark (default: blue)
    pub lsb_channel: LsbChannel,
    /// Render visualizations for tampered results (default: true)
    pub visualize: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            region_cell: DEFAULT_REGION_CELL,
            lsb_channel: LsbChannel::default(),
            visualize: true,
        }
    }
}

impl DetectionConfig {
    /// Load configuration from `PIXELPROOF_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let tile_size = lookup("PIXELPROOF_TILE_SIZE")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.tile_size);

        let block_threshold = lookup("PIXELPROOF_BLOCK_THRESHOLD")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.block_threshold);

        let confidence_threshold = lookup("PIXELPROOF_CONFIDENCE_THRESHOLD")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.confidence_threshold);

        let region_cell = lookup("PIXELPROOF_REGION_CELL")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.region_cell);

        let lsb_channel = lookup("PIXELPROOF_LSB_CHANNEL")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.lsb_channel);

        // Enabled unless explicitly turned off
        let visualize = lookup("PIXELPROOF_VISUALIZE")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "false" | "0" | "no" | "off"))
            .unwrap_or(defaults.visualize);

        Self {
            tile_size,
            block_threshold,
            confidence_threshold,
            region_cell,
            lsb_channel,
            visualize,
        }
    }

    /// Reject values no detection could run with.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(PixelProofError::invalid("tile_size must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.block_threshold) {
            return Err(PixelProofError::invalid(format!(
                "block_threshold must be within [0, 1], got {}",
                self.block_threshold
            )));
        }
        validate_confidence_threshold(self.confidence_threshold)?;
        if self.region_cell == 0 {
            return Err(PixelProofError::invalid("region_cell must be greater than 0"));
        }
        Ok(())
    }
}

/// Confidence thresholds must lie in `(0, 1]`.
pub fn validate_confidence_threshold(threshold: f64) -> Result<()> {
    if threshold > 0.0 && threshold <= 1.0 {
        Ok(())
    } else {
        Err(PixelProofError::invalid(format!(
            "confidence_threshold must be within (0, 1], got {threshold}"
        )))
    }
}
