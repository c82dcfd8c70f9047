//! Exit codes following sysexits.h conventions.
//!
//! These codes give scripts and CI jobs a way to tell a tampered image apart
//! from a missing file or a bad invocation.

use pixelproof_core::PixelProofError;

/// Successful execution, image authentic.
pub const SUCCESS: i32 = 0;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// Data error: tampering detected, or sealed data failed authentication.
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open input file or detection.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// I/O error (cannot write output or store).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Help text appended to `--help`.
pub const HELP: &str = "\
Exit codes:
  0   Success (image authentic)
  1   General error
  64  Usage error
  65  Tampering detected or sealed data failed authentication
  66  Input file or detection not found
  74  Output or store I/O error";

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub const fn success() -> Self {
        Self {
            code: SUCCESS,
            message: None,
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        // Typed library errors first, then classify by context message
        let code = match err
            .chain()
            .find_map(|cause| cause.downcast_ref::<PixelProofError>())
        {
            Some(e) => Self::classify(e),
            None => Self::classify_message(&message),
        };

        Self {
            code,
            message: Some(message),
        }
    }

    fn classify(err: &PixelProofError) -> i32 {
        match err {
            PixelProofError::InvalidParameter(_) => USAGE_ERROR,
            PixelProofError::DimensionMismatch(_) | PixelProofError::Crypto(_) => {
                VERIFICATION_FAILED
            }
            PixelProofError::NotFound(_) | PixelProofError::Image(_) => INPUT_ERROR,
            PixelProofError::Storage(_) | PixelProofError::Serialization(_) => IO_ERROR,
            _ => GENERAL_ERROR,
        }
    }

    fn classify_message(message: &str) -> i32 {
        if message.contains("Failed to read") {
            INPUT_ERROR
        } else if message.contains("Verification failed") || message.contains("TAMPERED") {
            VERIFICATION_FAILED
        } else if message.contains("Unsupported output format")
            || message.contains("Invalid detection id")
            || message.contains("Nothing to do")
        {
            USAGE_ERROR
        } else if message.contains("Failed to write") {
            IO_ERROR
        } else {
            GENERAL_ERROR
        }
    }
}
