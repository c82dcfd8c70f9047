//! Detect command implementation.

use std::path::PathBuf;

use anyhow::Result;
use pixelproof_core::ImageInput;

use super::{print_report, verdict};
use crate::utils::{build_service, image_id, load_image, GlobalOpts};

/// Execute the detect command.
pub fn execute(
    opts: &GlobalOpts,
    image_path: PathBuf,
    confidence_threshold: Option<f64>,
) -> Result<()> {
    let image = load_image(&image_path)?;
    let id = image_id(&image_path);

    let service = build_service(opts, None)?;
    let outcome = service.detect_with_model(
        ImageInput::new(&image).with_id(&id),
        confidence_threshold,
    )?;

    print_report(opts, &outcome)?;
    verdict(&outcome)
}
