//! PixelProof Core - tamper detection, localization and tile recovery
//!
//! This crate decides whether a raster image has been altered since a
//! trusted baseline was produced, localizes the altered pixels, and, for
//! block comparisons, reconstructs altered tiles from sealed copies of the
//! original.
//!
//! # Strategies
//!
//! - Keyed LSB watermark embedded into one color channel ([`watermark`])
//! - Tile-by-tile comparison against a reference image ([`compare`])
//! - Pluggable learned detector with a placeholder fallback ([`detector`])
//!
//! # Example
//!
//! ```
//! use image::{Rgb, RgbImage};
//! use pixelproof_core::{DetectionService, ImageInput};
//!
//! # fn main() -> pixelproof_core::Result<()> {
//! let service = DetectionService::builder().build()?;
//!
//! let reference = RgbImage::from_fn(128, 128, |x, y| Rgb([x as u8, y as u8, 90]));
//! let mut candidate = reference.clone();
//! for y in 0..64 {
//!     for x in 64..128 {
//!         candidate.put_pixel(x, y, Rgb([255, 255, 255]));
//!     }
//! }
//!
//! let outcome = service.compare_blocks(
//!     ImageInput::new(&reference),
//!     ImageInput::new(&candidate),
//!     None,
//!     None,
//! )?;
//! assert_eq!(outcome.result.tamper_ratio, 0.25);
//!
//! // The flagged tile can be restored byte-for-byte from the sealed original.
//! let restored = service.restore_blocks(outcome.result.id, &[1])?;
//! assert!(restored[0].is_available());
//! # Ok(())
//! # }
//! ```

pub mod compare;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod mask;
pub mod record;
pub mod recovery;
pub mod regions;
pub mod store;
pub mod visualize;
pub mod watermark;

// Re-export main types for convenience
pub use compare::{BlockComparator, BlockComparison, DEFAULT_BLOCK_THRESHOLD, DEFAULT_TILE_SIZE};
pub use config::DetectionConfig;
pub use detection::{DetectionService, DetectionServiceBuilder, ImageInput};
pub use detector::{
    select_detector, DetectorHealth, DetectorOutput, PlaceholderDetector, TamperDetector,
};
pub use error::{PixelProofError, Result};
pub use mask::{normalize, Mask, RawMask};
pub use record::{
    BlockInfo, BoundingBox, DetectionOutcome, DetectionParams, DetectionResult,
    DetectionStrategy, Diagnostic, RestoredBlock, TamperRegion, TamperedBlock,
};
pub use recovery::{apply_restored_blocks, RecoveryStore, SealingKey, TileCipher, XChaChaTileCipher};
pub use regions::regions_from_mask;
pub use store::{DetectionRecord, DetectionStore, FileDetectionStore, MemoryDetectionStore};
pub use visualize::{render_regions, ArtifactSink, DirectoryArtifactSink, MemoryArtifactSink};
pub use watermark::{derive_seed, LsbChannel, WatermarkKey};
