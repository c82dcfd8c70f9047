//! Keyed LSB watermark.
//!
//! A user secret is digested into a 32-bit seed, the seed drives a private
//! PRNG that produces one bit per pixel, and that bit pattern is written into
//! the least-significant bit of one color channel. Verification regenerates
//! the pattern and flags every pixel whose LSB disagrees.
//!
//! # Components
//!
//! - **Key**: secret wrapper, digest and seed derivation ([`key`])
//! - **Grid**: deterministic bit grid sized to the image ([`grid`])
//! - **Codec**: embedding and extraction/scoring ([`codec`])
//!
//! # Limitations
//!
//! Extracting with a different key than the one used for embedding compares
//! against an unrelated grid and reports roughly half of all pixels as
//! mismatched. That case is indistinguishable from heavy tampering and is
//! reported the same way.

pub mod codec;
pub mod grid;
pub mod key;

pub use codec::{embed, extract_and_score, LsbChannel, WatermarkScore};
pub use grid::WatermarkGrid;
pub use key::{derive_seed, WatermarkKey};
