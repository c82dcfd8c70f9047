//! Grouping of flagged pixels into reportable boxes.
//!
//! The mask is quantized into square cells; a cell counts as flagged when
//! any pixel inside it is. Flagged cells that share an edge are merged and
//! each connected group yields one bounding box, clipped to the image.

use std::collections::VecDeque;

use crate::mask::Mask;
use crate::record::{BoundingBox, TamperRegion};

/// Default cell edge used for grouping, in pixels.
pub const DEFAULT_REGION_CELL: u32 = 32;

/// Extract bounding boxes of connected flagged areas.
///
/// Regions are ordered by the row-major position of their first cell.
/// `cell` values of 0 are treated as 1.
pub fn regions_from_mask(mask: &Mask, cell: u32, confidence: Option<f64>) -> Vec<TamperRegion> {
    let cell = cell.max(1);
    let cols = mask.width().div_ceil(cell) as usize;
    let rows = mask.height().div_ceil(cell) as usize;

    let mut flagged = vec![false; cols * rows];
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            if mask.get(x, y) {
                flagged[(y / cell) as usize * cols + (x / cell) as usize] = true;
            }
        }
    }

    let mut visited = vec![false; cols * rows];
    let mut regions = Vec::new();

    for start in 0..flagged.len() {
        if !flagged[start] || visited[start] {
            continue;
        }

        let (mut min_c, mut min_r) = (usize::MAX, usize::MAX);
        let (mut max_c, mut max_r) = (0usize, 0usize);
        let mut queue = VecDeque::from([start]);
        visited[start] = true;

        while let Some(idx) = queue.pop_front() {
            let (c, r) = (idx % cols, idx / cols);
            min_c = min_c.min(c);
            min_r = min_r.min(r);
            max_c = max_c.max(c);
            max_r = max_r.max(r);

            let mut neighbors = Vec::with_capacity(4);
            if c > 0 {
                neighbors.push(idx - 1);
            }
            if c + 1 < cols {
                neighbors.push(idx + 1);
            }
            if r > 0 {
                neighbors.push(idx - cols);
            }
            if r + 1 < rows {
                neighbors.push(idx + cols);
            }
            for n in neighbors {
                if flagged[n] && !visited[n] {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }

        let x = min_c as u32 * cell;
        let y = min_r as u32 * cell;
        let right = ((max_c as u32 + 1) * cell).min(mask.width());
        let bottom = ((max_r as u32 + 1) * cell).min(mask.height());

        regions.push(TamperRegion {
            bbox: BoundingBox::new(x, y, right - x, bottom - y),
            confidence,
        });
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_mask_has_no_regions() {
        assert!(regions_from_mask(&Mask::new(64, 64), 16, None).is_empty());
    }

    #[test]
    fn test_single_pixel_yields_its_cell() {
        let mut mask = Mask::new(64, 64);
        mask.set(20, 5, true);
        let regions = regions_from_mask(&mask, 16, None);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, BoundingBox::new(16, 0, 16, 16));
        assert_eq!(regions[0].confidence, None);
    }

    #[test]
    fn test_adjacent_cells_merge() {
        let mut mask = Mask::new(64, 64);
        mask.set(1, 1, true);
        mask.set(17, 1, true);
        mask.set(17, 17, true);
        let regions = regions_from_mask(&mask, 16, Some(0.8));
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].bbox, BoundingBox::new(0, 0, 32, 32));
        assert_eq!(regions[0].confidence, Some(0.8));
    }

    #[test]
    fn test_separate_areas_stay_separate() {
        let mut mask = Mask::new(64, 64);
        mask.set(0, 0, true);
        mask.set(63, 63, true);
        let regions = regions_from_mask(&mask, 16, None);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].bbox, BoundingBox::new(0, 0, 16, 16));
        assert_eq!(regions[1].bbox, BoundingBox::new(48, 48, 16, 16));
    }

    #[test]
    fn test_diagonal_cells_do_not_merge() {
        let mut mask = Mask::new(32, 32);
        mask.set(0, 0, true);
        mask.set(16, 16, true);
        assert_eq!(regions_from_mask(&mask, 16, None).len(), 2);
    }

    #[test]
    fn test_edge_cells_are_clipped() {
        let mut mask = Mask::new(40, 20);
        mask.set(39, 19, true);
        let regions = regions_from_mask(&mask, 32, None);
        assert_eq!(regions[0].bbox, BoundingBox::new(32, 0, 8, 20));
    }
}
