//! Compare command implementation.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use pixelproof_core::{DetectionOutcome, ImageInput};

use super::{print_report, verdict};
use crate::utils::{build_service, image_id, load_image, GlobalOpts};

/// Execute the compare command.
pub fn execute(
    opts: &GlobalOpts,
    reference_path: PathBuf,
    candidate_path: PathBuf,
    tile_size: Option<u32>,
    threshold: Option<f64>,
    passphrase: String,
) -> Result<()> {
    let reference = load_image(&reference_path)?;
    let candidate = load_image(&candidate_path)?;
    let reference_id = image_id(&reference_path);
    let candidate_id = image_id(&candidate_path);

    let service = build_service(opts, Some(&passphrase))?;
    let outcome = service.compare_blocks(
        ImageInput::new(&reference).with_id(&reference_id),
        ImageInput::new(&candidate).with_id(&candidate_id),
        tile_size,
        threshold,
    )?;

    print_report(opts, &outcome)?;
    if opts.human() && outcome.result.is_tampered {
        print_block_table(&outcome);
    }
    verdict(&outcome)
}

fn print_block_table(outcome: &DetectionOutcome) {
    println!();
    let header = format!("{:>5}  {:>17}  {:>10}  {}", "BLOCK", "BOX", "DIFF", "RECOVERABLE");
    println!("   {}", header.dimmed());
    for block in outcome.tampered_blocks() {
        let b = block.bbox;
        let recoverable = if block.has_original_data {
            "yes".green()
        } else {
            "no".red()
        };
        println!(
            "   {:>5}  {:>17}  {:>10.4}  {}",
            block.block_index,
            format!("{}x{}+{}+{}", b.width, b.height, b.x, b.y),
            block.difference_ratio,
            recoverable
        );
    }
}
