//! Inert detector used when no learned backend is available.

use image::RgbImage;

use super::{DetectorOutput, TamperDetector};
use crate::error::Result;

/// Always answers "no tamper, confidence 0" without looking at the image.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderDetector;

impl TamperDetector for PlaceholderDetector {
    fn detect(&self, _image: &RgbImage, _confidence_threshold: f32) -> Result<DetectorOutput> {
        Ok(DetectorOutput::clean())
    }

    fn name(&self) -> &str {
        "placeholder"
    }
}
