use thiserror::Error;

#[derive(Error, Debug)]
pub enum PixelProofError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("Visualization failed: {0}")]
    VisualizationFailed(String),

    #[error("Recovery data missing for block {block_index}")]
    RecoveryDataMissing { block_index: u32 },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Detection not found: {0}")]
    NotFound(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Processing failed: {0}")]
    Processing(String),
}

impl PixelProofError {
    /// Create an invalid parameter error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    /// Whether the orchestrator is allowed to absorb this error and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DetectorUnavailable(_)
                | Self::VisualizationFailed(_)
                | Self::RecoveryDataMissing { .. }
        )
    }
}

impl From<std::io::Error> for PixelProofError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PixelProofError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(PixelProofError::DetectorUnavailable("no backend".into()).is_recoverable());
        assert!(PixelProofError::VisualizationFailed("disk full".into()).is_recoverable());
        assert!(PixelProofError::RecoveryDataMissing { block_index: 3 }.is_recoverable());
        assert!(!PixelProofError::invalid("tile_size must be > 0").is_recoverable());
        assert!(!PixelProofError::Crypto("bad tag".into()).is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = PixelProofError::RecoveryDataMissing { block_index: 7 };
        assert_eq!(err.to_string(), "Recovery data missing for block 7");

        let err = PixelProofError::invalid("threshold must be within [0, 1]");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: threshold must be within [0, 1]"
        );
    }
}
