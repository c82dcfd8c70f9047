//! Tamper masks and their normalization.
//!
//! Every strategy eventually yields a boolean [`Mask`] with exactly the
//! subject image's dimensions. Masks coming from outside the crate (the
//! learned detector in particular) arrive as a [`RawMask`] of arbitrary
//! shape and go through [`normalize`] first:
//!
//! 1. a 1-D mask with `height * width` elements is reshaped row-major;
//! 2. a 2-D mask of a different size is resized with nearest-neighbor
//!    sampling (never smoothing) and binarized at 0.5;
//! 3. anything else is a [`PixelProofError::DimensionMismatch`].
//!
//! A trailing unit channel (`[h, w, 1]`) is squeezed before rule 2.

use serde::{Deserialize, Serialize};

use crate::error::{PixelProofError, Result};
use crate::record::{flagged_ratio, BoundingBox};

/// Binarization cut point: values strictly above it are tampered.
pub const MASK_CUT: f32 = 0.5;

/// Boolean tamper mask, row-major, `true` = tampered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    /// All-clear mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![false; width as usize * height as usize],
        }
    }

    /// Build from row-major flags. Panics if the length does not match;
    /// callers inside the crate always size the buffer from the image.
    pub(crate) fn from_flags(width: u32, height: u32, data: Vec<bool>) -> Self {
        assert_eq!(data.len(), width as usize * height as usize);
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.data[y as usize * self.width as usize + x as usize] = value;
    }

    /// Flag every pixel inside `bbox`, clipped to the mask.
    pub fn fill(&mut self, bbox: &BoundingBox) {
        let right = bbox.right().min(self.width);
        let bottom = bbox.bottom().min(self.height);
        for y in bbox.y.min(bottom)..bottom {
            for x in bbox.x.min(right)..right {
                self.set(x, y, true);
            }
        }
    }

    pub fn flagged(&self) -> u64 {
        self.data.iter().filter(|v| **v).count() as u64
    }

    pub fn any(&self) -> bool {
        self.data.iter().any(|v| *v)
    }

    /// Flagged fraction, 4 decimals; non-zero whenever any pixel is flagged.
    pub fn flagged_ratio(&self) -> f64 {
        flagged_ratio(self.flagged(), self.data.len() as u64)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.data
    }

    /// Convert back into a 2-D raw mask of 0.0/1.0 values.
    pub fn to_raw(&self) -> RawMask {
        RawMask {
            shape: vec![self.height as usize, self.width as usize],
            values: self.data.iter().map(|v| if *v { 1.0 } else { 0.0 }).collect(),
        }
    }
}

/// Mask of arbitrary shape as produced by an external detector.
///
/// `values` is row-major over `shape` (`[len]`, `[rows, cols]` or
/// `[rows, cols, 1]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMask {
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

impl RawMask {
    pub fn flat(values: Vec<f32>) -> Self {
        Self {
            shape: vec![values.len()],
            values,
        }
    }

    pub fn grid(rows: usize, cols: usize, values: Vec<f32>) -> Self {
        Self {
            shape: vec![rows, cols],
            values,
        }
    }
}

/// Reconcile `raw` with a `width x height` image.
pub fn normalize(raw: &RawMask, width: u32, height: u32) -> Result<Mask> {
    let expected = width as usize * height as usize;
    let element_count = raw.shape.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d));

    // A flat empty mask is the row-major reshape of an empty image
    if expected == 0 && raw.shape == [0] && raw.values.is_empty() {
        return Ok(Mask::new(width, height));
    }

    if raw.shape.is_empty() || raw.shape.contains(&0) || element_count != Some(raw.values.len()) {
        return Err(PixelProofError::DimensionMismatch(format!(
            "mask shape {:?} does not describe {} values",
            raw.shape,
            raw.values.len()
        )));
    }

    let (rows, cols) = match raw.shape.as_slice() {
        [len] if *len == expected => (height as usize, width as usize),
        [len] => {
            return Err(PixelProofError::DimensionMismatch(format!(
                "1-D mask of {len} values cannot be reshaped to {height}x{width}"
            )))
        }
        [rows, cols] | [rows, cols, 1] => (*rows, *cols),
        other => {
            return Err(PixelProofError::DimensionMismatch(format!(
                "mask shape {other:?} is not reconcilable with {height}x{width}"
            )))
        }
    };

    if expected == 0 {
        return Ok(Mask::new(width, height));
    }

    let data = if rows == height as usize && cols == width as usize {
        raw.values.iter().map(|v| *v > MASK_CUT).collect()
    } else {
        tracing::debug!(rows, cols, width, height, "Resizing mask (nearest neighbor)");
        resize_nearest(&raw.values, rows, cols, width as usize, height as usize)
    };

    Ok(Mask::from_flags(width, height, data))
}

fn resize_nearest(values: &[f32], rows: usize, cols: usize, width: usize, height: usize) -> Vec<bool> {
    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let sy = (y * rows / height).min(rows - 1);
        for x in 0..width {
            let sx = (x * cols / width).min(cols - 1);
            out.push(values[sy * cols + sx] > MASK_CUT);
        }
    }
    out
}
