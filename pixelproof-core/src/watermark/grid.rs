//! Deterministic watermark bit grid.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// One pseudo-random bit per pixel position, row-major.
///
/// The generator is built inside [`WatermarkGrid::generate`] and dropped when
/// it returns, so concurrent callers never share PRNG state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkGrid {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl WatermarkGrid {
    /// Generate the grid for a `width x height` image from a seed.
    ///
    /// Each `u32` drawn from the ChaCha20 stream supplies 32 consecutive
    /// bits, least-significant first.
    pub fn generate(seed: u32, width: u32, height: u32) -> Self {
        let total = width as usize * height as usize;
        let mut rng = ChaCha20Rng::seed_from_u64(u64::from(seed));

        let mut bits = Vec::with_capacity(total);
        while bits.len() < total {
            let word = rng.next_u32();
            let take = (total - bits.len()).min(32);
            bits.extend((0..take).map(|i| (word >> i) & 1 == 1));
        }

        Self {
            width,
            height,
            bits,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Bit at pixel `(x, y)`.
    pub fn bit(&self, x: u32, y: u32) -> bool {
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}
