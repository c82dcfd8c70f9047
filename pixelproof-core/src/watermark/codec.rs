//! LSB embedding and extraction.
//!
//! # Usage
//!
//! ```
//! use image::RgbImage;
//! use pixelproof_core::watermark::{embed, extract_and_score, LsbChannel, WatermarkKey};
//!
//! let key = WatermarkKey::from("studio-secret");
//! let original = RgbImage::from_pixel(32, 32, image::Rgb([120, 80, 200]));
//! let marked = embed(&original, &key, LsbChannel::Blue);
//!
//! let score = extract_and_score(&marked, &key, LsbChannel::Blue);
//! assert_eq!(score.ratio, 0.0);
//! ```

use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::grid::WatermarkGrid;
use super::key::WatermarkKey;
use crate::error::PixelProofError;
use crate::mask::Mask;
use crate::record::flagged_ratio;

/// Color channel whose LSB carries the watermark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LsbChannel {
    Red,
    Green,
    #[default]
    Blue,
}

impl LsbChannel {
    pub fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }
}

impl std::fmt::Display for LsbChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Red => write!(f, "red"),
            Self::Green => write!(f, "green"),
            Self::Blue => write!(f, "blue"),
        }
    }
}

impl FromStr for LsbChannel {
    type Err = PixelProofError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "red" | "r" => Ok(Self::Red),
            "green" | "g" => Ok(Self::Green),
            "blue" | "b" => Ok(Self::Blue),
            other => Err(PixelProofError::invalid(format!(
                "unknown LSB channel '{other}' (expected red, green or blue)"
            ))),
        }
    }
}

/// Result of comparing an image's LSB plane against the expected grid.
#[derive(Debug, Clone)]
pub struct WatermarkScore {
    /// `true` where the pixel's LSB disagrees with the grid.
    pub mask: Mask,
    pub mismatched: u64,
    pub total: u64,
    /// `mismatched / total`, rounded to 4 decimals but never below 0.0001
    /// while any pixel mismatches. 0 means authentic.
    pub ratio: f64,
}

impl WatermarkScore {
    pub fn is_tampered(&self) -> bool {
        self.mismatched > 0
    }
}

/// Write the key's grid into the LSB of `channel`, returning a new image.
///
/// The LSB is set to the grid bit rather than toggled, so embedding an
/// already marked image with the same key leaves it unchanged.
pub fn embed(image: &RgbImage, key: &WatermarkKey, channel: LsbChannel) -> RgbImage {
    let grid = WatermarkGrid::generate(key.seed(), image.width(), image.height());
    let c = channel.index();

    let mut marked = image.clone();
    for (x, y, pixel) in marked.enumerate_pixels_mut() {
        let bit = u8::from(grid.bit(x, y));
        pixel.0[c] = (pixel.0[c] & 0xFE) | bit;
    }

    debug!(
        width = image.width(),
        height = image.height(),
        channel = %channel,
        "Embedded watermark"
    );

    marked
}

/// Regenerate the key's grid and flag every pixel whose LSB disagrees.
pub fn extract_and_score(image: &RgbImage, key: &WatermarkKey, channel: LsbChannel) -> WatermarkScore {
    let (width, height) = image.dimensions();
    let grid = WatermarkGrid::generate(key.seed(), width, height);
    let c = channel.index();

    let mut flags = Vec::with_capacity(grid.len());
    for (x, y, pixel) in image.enumerate_pixels() {
        let bit = pixel.0[c] & 0x01 == 1;
        flags.push(bit != grid.bit(x, y));
    }

    let mismatched = flags.iter().filter(|f| **f).count() as u64;
    let total = u64::from(width) * u64::from(height);
    let ratio = flagged_ratio(mismatched, total);

    debug!(mismatched, total, ratio, "Scored watermark");

    WatermarkScore {
        mask: Mask::from_flags(width, height, flags),
        mismatched,
        total,
        ratio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn test_embed_then_verify_is_clean() {
        let key = WatermarkKey::from("k1");
        let marked = embed(&gradient(40, 30), &key, LsbChannel::Blue);
        let score = extract_and_score(&marked, &key, LsbChannel::Blue);
        assert_eq!(score.mismatched, 0);
        assert_eq!(score.ratio, 0.0);
        assert_eq!(score.total, 1200);
    }

    #[test]
    fn test_embed_is_idempotent() {
        let key = WatermarkKey::from("k1");
        let once = embed(&gradient(16, 16), &key, LsbChannel::Red);
        let twice = embed(&once, &key, LsbChannel::Red);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_embed_only_touches_designated_lsb() {
        let key = WatermarkKey::from("k1");
        let original = gradient(16, 16);
        let marked = embed(&original, &key, LsbChannel::Green);
        for (a, b) in original.pixels().zip(marked.pixels()) {
            assert_eq!(a.0[0], b.0[0]);
            assert_eq!(a.0[2], b.0[2]);
            assert_eq!(a.0[1] & 0xFE, b.0[1] & 0xFE);
        }
    }

    #[test]
    fn test_tampered_pixels_are_flagged() {
        let key = WatermarkKey::from("k1");
        let mut marked = embed(&gradient(20, 20), &key, LsbChannel::Blue);
        // Flip the LSB of two pixels.
        marked.get_pixel_mut(3, 4).0[2] ^= 1;
        marked.get_pixel_mut(10, 15).0[2] ^= 1;

        let score = extract_and_score(&marked, &key, LsbChannel::Blue);
        assert_eq!(score.mismatched, 2);
        assert!(score.mask.get(3, 4));
        assert!(score.mask.get(10, 15));
        assert!(!score.mask.get(0, 0));
        assert_eq!(score.ratio, 0.005);
    }

    #[test]
    fn test_single_flipped_pixel_on_large_image_is_tampered() {
        let key = WatermarkKey::from("k");
        let mut marked = embed(&gradient(200, 200), &key, LsbChannel::Blue);
        marked.get_pixel_mut(120, 7).0[2] ^= 1;

        let score = extract_and_score(&marked, &key, LsbChannel::Blue);
        assert_eq!(score.mismatched, 1);
        assert!(score.is_tampered());
        // 1 / 40000 would round to zero
        assert_eq!(score.ratio, 0.0001);
    }

    #[test]
    fn test_wrong_key_reports_near_half() {
        let marked = embed(&gradient(64, 64), &WatermarkKey::from("right"), LsbChannel::Blue);
        let score = extract_and_score(&marked, &WatermarkKey::from("wrong"), LsbChannel::Blue);
        assert!(score.ratio > 0.4 && score.ratio < 0.6, "ratio = {}", score.ratio);
    }

    #[test]
    fn test_empty_image_scores_zero() {
        let score = extract_and_score(&RgbImage::new(0, 0), &WatermarkKey::from("k"), LsbChannel::Blue);
        assert_eq!(score.ratio, 0.0);
        assert_eq!(score.total, 0);
    }

    #[test]
    fn test_channel_parsing() {
        assert_eq!("Blue".parse::<LsbChannel>().unwrap(), LsbChannel::Blue);
        assert_eq!("r".parse::<LsbChannel>().unwrap(), LsbChannel::Red);
        assert!("alpha".parse::<LsbChannel>().is_err());
        assert_eq!(LsbChannel::default(), LsbChannel::Blue);
    }
}
