//! Reference-based block comparison.
//!
//! Both images are cut into the same row-major grid of `tile_size` squares
//! (the grid follows the reference; edge tiles may be smaller). For each tile
//! the mean absolute per-channel difference is normalized by 255; candidate
//! pixels that fall outside the candidate's bounds count as fully different,
//! so a size mismatch degrades into flagged tiles instead of an error.
//!
//! Tiles are scored in parallel. The aggregate ratio requires every tile, so
//! a comparison always runs to completion.

use image::{imageops, RgbImage};
use rayon::prelude::*;
use tracing::debug;

use crate::error::{PixelProofError, Result};
use crate::mask::Mask;
use crate::record::{flagged_ratio, BoundingBox};

/// Default tile edge in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Default per-tile difference threshold.
pub const DEFAULT_BLOCK_THRESHOLD: f64 = 0.1;

/// Scored tile.
#[derive(Debug, Clone)]
pub struct BlockOutcome {
    pub index: u32,
    pub bbox: BoundingBox,
    pub difference_ratio: f64,
    pub is_tampered: bool,
    /// Reference pixels of the tile, captured only for tampered tiles.
    pub original: Option<RgbImage>,
}

/// Full comparison result.
#[derive(Debug, Clone)]
pub struct BlockComparison {
    pub blocks: Vec<BlockOutcome>,
    pub tampered_count: usize,
    /// Tampered tiles / total tiles, 4 decimals.
    pub ratio: f64,
    /// Pixel mask with every tampered tile filled, reference-sized.
    pub mask: Mask,
    /// Whether the candidate's dimensions differed from the reference.
    pub size_mismatch: bool,
}

impl BlockComparison {
    pub fn is_tampered(&self) -> bool {
        self.tampered_count > 0
    }

    pub fn tile_count(&self) -> usize {
        self.blocks.len()
    }
}

/// Tile comparator with validated parameters.
#[derive(Debug, Clone, Copy)]
pub struct BlockComparator {
    tile_size: u32,
    threshold: f64,
}

impl Default for BlockComparator {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            threshold: DEFAULT_BLOCK_THRESHOLD,
        }
    }
}

impl BlockComparator {
    /// Create a comparator, rejecting `tile_size == 0` and thresholds outside
    /// `[0, 1]`.
    pub fn new(tile_size: u32, threshold: f64) -> Result<Self> {
        if tile_size == 0 {
            return Err(PixelProofError::invalid("tile_size must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(PixelProofError::invalid(format!(
                "threshold must be within [0, 1], got {threshold}"
            )));
        }
        Ok(Self {
            tile_size,
            threshold,
        })
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Tile boxes over a `width x height` image in row-major order.
    pub fn tiles(&self, width: u32, height: u32) -> Vec<BoundingBox> {
        let mut tiles = Vec::new();
        let mut y = 0;
        while y < height {
            let h = self.tile_size.min(height - y);
            let mut x = 0;
            while x < width {
                let w = self.tile_size.min(width - x);
                tiles.push(BoundingBox::new(x, y, w, h));
                x += w;
            }
            y += h;
        }
        tiles
    }

    /// Compare `candidate` against the trusted `reference`.
    pub fn compare(&self, reference: &RgbImage, candidate: &RgbImage) -> BlockComparison {
        let (width, height) = reference.dimensions();
        let size_mismatch = reference.dimensions() != candidate.dimensions();
        if size_mismatch {
            debug!(
                reference = ?reference.dimensions(),
                candidate = ?candidate.dimensions(),
                "Dimension mismatch, out-of-bounds pixels count as different"
            );
        }

        let blocks: Vec<BlockOutcome> = self
            .tiles(width, height)
            .into_par_iter()
            .enumerate()
            .map(|(index, bbox)| {
                let difference_ratio = tile_difference(reference, candidate, &bbox);
                let is_tampered = difference_ratio > self.threshold;
                let original = is_tampered.then(|| {
                    imageops::crop_imm(reference, bbox.x, bbox.y, bbox.width, bbox.height)
                        .to_image()
                });
                BlockOutcome {
                    index: index as u32,
                    bbox,
                    difference_ratio,
                    is_tampered,
                    original,
                }
            })
            .collect();

        let mut mask = Mask::new(width, height);
        let mut tampered_count = 0;
        for block in blocks.iter().filter(|b| b.is_tampered) {
            mask.fill(&block.bbox);
            tampered_count += 1;
        }

        let ratio = flagged_ratio(tampered_count as u64, blocks.len() as u64);

        debug!(
            tiles = blocks.len(),
            tampered = tampered_count,
            ratio,
            tile_size = self.tile_size,
            threshold = self.threshold,
            "Block comparison complete"
        );

        BlockComparison {
            blocks,
            tampered_count,
            ratio,
            mask,
            size_mismatch,
        }
    }
}

/// Mean absolute per-channel difference over `bbox`, normalized to `[0, 1]`.
fn tile_difference(reference: &RgbImage, candidate: &RgbImage, bbox: &BoundingBox) -> f64 {
    let (cw, ch) = candidate.dimensions();
    let mut total = 0.0f64;

    for y in bbox.y..bbox.bottom() {
        for x in bbox.x..bbox.right() {
            if x >= cw || y >= ch {
                total += 3.0;
                continue;
            }
            let r = reference.get_pixel(x, y).0;
            let c = candidate.get_pixel(x, y).0;
            total += r
                .iter()
                .zip(c.iter())
                .map(|(a, b)| f64::from(a.abs_diff(*b)) / 255.0)
                .sum::<f64>();
        }
    }

    let samples = bbox.area() as f64 * 3.0;
    if samples == 0.0 {
        0.0
    } else {
        total / samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn textured(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 200) as u8 + 20, (y % 200) as u8 + 20, 128])
        })
    }

    fn invert_tile(image: &mut RgbImage, bbox: BoundingBox) {
        for y in bbox.y..bbox.bottom() {
            for x in bbox.x..bbox.right() {
                let p = image.get_pixel_mut(x, y);
                p.0 = [255 - p.0[0], 255 - p.0[1], 255 - p.0[2]];
            }
        }
    }

    #[test]
    fn test_parameter_validation() {
        assert!(BlockComparator::new(0, 0.1).is_err());
        assert!(BlockComparator::new(64, -0.01).is_err());
        assert!(BlockComparator::new(64, 1.5).is_err());
        assert!(BlockComparator::new(64, f64::NAN).is_err());
        assert!(BlockComparator::new(64, 0.0).is_ok());
        assert!(BlockComparator::new(64, 1.0).is_ok());
    }

    #[test]
    fn test_tiles_cover_truncated_edges() {
        let comparator = BlockComparator::new(64, 0.1).unwrap();
        let tiles = comparator.tiles(100, 70);
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles[1], BoundingBox::new(64, 0, 36, 64));
        assert_eq!(tiles[2], BoundingBox::new(0, 64, 64, 6));
        assert_eq!(tiles[3], BoundingBox::new(64, 64, 36, 6));
    }

    #[test]
    fn test_identical_images_are_clean() {
        let image = textured(128, 128);
        let result = BlockComparator::default().compare(&image, &image);
        assert_eq!(result.tile_count(), 4);
        assert_eq!(result.tampered_count, 0);
        assert_eq!(result.ratio, 0.0);
        assert!(!result.is_tampered());
        assert!(result.blocks.iter().all(|b| b.original.is_none()));
    }

    #[test]
    fn test_single_corrupted_tile() {
        let reference = textured(128, 128);
        let mut candidate = reference.clone();
        invert_tile(&mut candidate, BoundingBox::new(64, 0, 64, 64));

        let result = BlockComparator::default().compare(&reference, &candidate);
        assert_eq!(result.ratio, 0.25);
        let flagged: Vec<u32> = result
            .blocks
            .iter()
            .filter(|b| b.is_tampered)
            .map(|b| b.index)
            .collect();
        assert_eq!(flagged, vec![1]);

        // Captured tile is the reference's, never the candidate's.
        let original = result.blocks[1].original.as_ref().unwrap();
        assert_eq!(original.dimensions(), (64, 64));
        assert_eq!(original.get_pixel(0, 0), reference.get_pixel(64, 0));
        assert!(result.mask.get(100, 10));
        assert!(!result.mask.get(10, 10));
    }

    #[test]
    fn test_smaller_candidate_counts_missing_pixels_as_different() {
        let reference = textured(128, 128);
        let candidate = imageops::crop_imm(&reference, 0, 0, 64, 128).to_image();

        let result = BlockComparator::default().compare(&reference, &candidate);
        assert!(result.size_mismatch);
        let flagged: Vec<u32> = result
            .blocks
            .iter()
            .filter(|b| b.is_tampered)
            .map(|b| b.index)
            .collect();
        assert_eq!(flagged, vec![1, 3]);
        assert_eq!(result.blocks[1].difference_ratio, 1.0);
        assert_eq!(result.ratio, 0.5);
    }

    #[test]
    fn test_small_noise_stays_below_threshold() {
        let reference = textured(64, 64);
        let mut candidate = reference.clone();
        for p in candidate.pixels_mut() {
            p.0[0] = p.0[0].saturating_add(5);
        }
        let result = BlockComparator::default().compare(&reference, &candidate);
        assert!(!result.is_tampered());
        assert!(result.blocks[0].difference_ratio > 0.0);
    }

    #[test]
    fn test_one_pixel_tile_among_many_is_tampered() {
        let reference = textured(200, 200);
        let mut candidate = reference.clone();
        let Rgb([r, g, b]) = *candidate.get_pixel(50, 50);
        candidate.put_pixel(50, 50, Rgb([255 - r, 255 - g, 255 - b]));

        let result = BlockComparator::new(1, 0.1).unwrap().compare(&reference, &candidate);
        assert_eq!(result.tile_count(), 40_000);
        assert_eq!(result.tampered_count, 1);
        assert!(result.is_tampered());
        assert_eq!(result.ratio, 0.0001);
    }

    #[test]
    fn test_empty_reference() {
        let result = BlockComparator::default().compare(&RgbImage::new(0, 0), &textured(8, 8));
        assert_eq!(result.tile_count(), 0);
        assert_eq!(result.ratio, 0.0);
    }
}
