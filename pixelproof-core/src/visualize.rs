//! Rendering of detected regions and storage of the renderings.
//!
//! Renderings are a convenience; callers treat any failure here as a
//! degradation of the detection, never as its failure.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use uuid::Uuid;

use crate::error::{PixelProofError, Result};
use crate::record::TamperRegion;

/// Outline color.
pub const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Outline thickness in pixels.
pub const OUTLINE_WIDTH: u32 = 2;

/// Draw a hollow outline around every region on a copy of `image`.
///
/// Fails with [`PixelProofError::VisualizationFailed`] when a region does
/// not lie inside the image.
pub fn render_regions(image: &RgbImage, regions: &[TamperRegion]) -> Result<RgbImage> {
    let (width, height) = image.dimensions();
    let mut canvas = image.clone();

    for region in regions {
        let bbox = region.bbox;
        if !bbox.fits_within(width, height) {
            return Err(PixelProofError::VisualizationFailed(format!(
                "region {}x{} at ({}, {}) exceeds {}x{} image",
                bbox.width, bbox.height, bbox.x, bbox.y, width, height
            )));
        }

        for inset in 0..OUTLINE_WIDTH {
            if bbox.width <= 2 * inset || bbox.height <= 2 * inset {
                break;
            }
            let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32)
                .of_size(bbox.width - 2 * inset, bbox.height - 2 * inset);
            draw_hollow_rect_mut(&mut canvas, rect, OUTLINE_COLOR);
        }
    }

    Ok(canvas)
}

/// Destination for rendered visualizations.
pub trait ArtifactSink: Send + Sync {
    /// Store the rendering for `detection_id` and return a reference to it.
    fn store(&self, detection_id: Uuid, image: &RgbImage) -> Result<String>;
}

/// Writes `<detection_id>.png` into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryArtifactSink {
    dir: PathBuf,
}

impl DirectoryArtifactSink {
    /// Create the sink, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| PixelProofError::VisualizationFailed(e.to_string()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirectoryArtifactSink {
    fn store(&self, detection_id: Uuid, image: &RgbImage) -> Result<String> {
        let path = self.dir.join(format!("{detection_id}.png"));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| PixelProofError::VisualizationFailed(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Visualization written");
        Ok(path.display().to_string())
    }
}

/// Keeps renderings in memory, keyed by detection id.
#[derive(Debug, Default)]
pub struct MemoryArtifactSink {
    artifacts: DashMap<Uuid, RgbImage>,
}

impl MemoryArtifactSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, detection_id: &Uuid) -> Option<RgbImage> {
        self.artifacts.get(detection_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactSink for MemoryArtifactSink {
    fn store(&self, detection_id: Uuid, image: &RgbImage) -> Result<String> {
        self.artifacts.insert(detection_id, image.clone());
        Ok(format!("memory://{detection_id}"))
    }
}
