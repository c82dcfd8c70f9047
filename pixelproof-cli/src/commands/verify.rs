//! Verify command implementation.

use std::path::PathBuf;

use anyhow::Result;
use pixelproof_core::{ImageInput, WatermarkKey};

use super::{print_report, verdict};
use crate::utils::{build_service, image_id, load_image, GlobalOpts};

/// Execute the verify command.
pub fn execute(opts: &GlobalOpts, image_path: PathBuf, key: String) -> Result<()> {
    let image = load_image(&image_path)?;
    let key = WatermarkKey::new(key.into_bytes());
    let id = image_id(&image_path);

    let service = build_service(opts, None)?;
    let outcome = service.verify_watermark(ImageInput::new(&image).with_id(&id), &key)?;

    print_report(opts, &outcome)?;
    verdict(&outcome)
}
