//! Learned tamper detector boundary.
//!
//! The detector itself (weights, inference runtime) lives outside this
//! crate. Anything that can map an image to a tamper mask plus a confidence
//! plugs in through [`TamperDetector`]. When no backend is supplied, or the
//! supplied one reports itself unavailable, [`select_detector`] hands out
//! the [`PlaceholderDetector`], which never reports tampering.
//!
//! ## Example
//!
//! ```
//! use pixelproof_core::detector::{select_detector, DetectorHealth};
//!
//! // No backend configured: the placeholder is selected.
//! let detector = select_detector(None);
//! assert_eq!(detector.name(), "placeholder");
//! assert_eq!(detector.health(), DetectorHealth::Ready);
//! ```

mod placeholder;

pub use placeholder::PlaceholderDetector;

use std::sync::Arc;

use image::RgbImage;

use crate::error::Result;
use crate::mask::RawMask;

/// What a detector returns for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOutput {
    /// Per-pixel tamper probability in any shape the normalizer accepts.
    /// `None` when the backend produced no localization.
    pub mask: Option<RawMask>,
    /// Image-level confidence in `[0, 1]`.
    pub confidence: f32,
}

impl DetectorOutput {
    /// "No tamper, confidence 0".
    pub fn clean() -> Self {
        Self {
            mask: None,
            confidence: 0.0,
        }
    }
}

/// Health of a detector backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorHealth {
    /// Backend is loaded and can run inference
    Ready,
    /// Backend's runtime dependency is missing
    Unavailable { reason: String },
}

/// Capability implemented by detector backends.
///
/// Implementations must be thread-safe (`Send + Sync`); one instance serves
/// concurrent detection calls. A backend that loses its runtime mid-flight
/// should return [`crate::PixelProofError::DetectorUnavailable`] so the
/// caller can substitute the placeholder for that call.
pub trait TamperDetector: Send + Sync {
    /// Run detection on `image`.
    fn detect(&self, image: &RgbImage, confidence_threshold: f32) -> Result<DetectorOutput>;

    /// Short backend identifier recorded in detection parameters.
    fn name(&self) -> &str;

    /// Whether the backend can currently run.
    fn health(&self) -> DetectorHealth {
        DetectorHealth::Ready
    }
}

/// Pick the detector used for the lifetime of a service.
///
/// Runs once at construction; a missing or unavailable backend is replaced
/// by the placeholder and only a log line records the substitution.
pub fn select_detector(backend: Option<Arc<dyn TamperDetector>>) -> Arc<dyn TamperDetector> {
    match backend {
        Some(detector) => match detector.health() {
            DetectorHealth::Ready => {
                tracing::info!(backend = detector.name(), "Using learned detector backend");
                detector
            }
            DetectorHealth::Unavailable { reason } => {
                tracing::warn!(
                    backend = detector.name(),
                    %reason,
                    "Detector backend unavailable, using placeholder"
                );
                Arc::new(PlaceholderDetector)
            }
        },
        None => {
            tracing::warn!("No detector backend configured, using placeholder");
            Arc::new(PlaceholderDetector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MissingRuntime;

    impl TamperDetector for MissingRuntime {
        fn detect(&self, _image: &RgbImage, _threshold: f32) -> Result<DetectorOutput> {
            unreachable!("never selected")
        }

        fn name(&self) -> &str {
            "missing-runtime"
        }

        fn health(&self) -> DetectorHealth {
            DetectorHealth::Unavailable {
                reason: "inference runtime not installed".into(),
            }
        }
    }

    struct AlwaysTampered;

    impl TamperDetector for AlwaysTampered {
        fn detect(&self, image: &RgbImage, _threshold: f32) -> Result<DetectorOutput> {
            let n = (image.width() * image.height()) as usize;
            Ok(DetectorOutput {
                mask: Some(RawMask::flat(vec![1.0; n])),
                confidence: 0.99,
            })
        }

        fn name(&self) -> &str {
            "always"
        }
    }

    #[test]
    fn test_none_selects_placeholder() {
        assert_eq!(select_detector(None).name(), "placeholder");
    }

    #[test]
    fn test_unavailable_backend_selects_placeholder() {
        let detector = select_detector(Some(Arc::new(MissingRuntime)));
        assert_eq!(detector.name(), "placeholder");
    }

    #[test]
    fn test_ready_backend_is_kept() {
        let detector = select_detector(Some(Arc::new(AlwaysTampered)));
        assert_eq!(detector.name(), "always");
        let output = detector.detect(&RgbImage::new(2, 2), 0.5).unwrap();
        assert_eq!(output.confidence, 0.99);
    }
}
