//! Blocks command implementation.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::utils::{build_service, parse_detection_id, print_json, GlobalOpts};

/// Execute the blocks command.
pub fn execute(opts: &GlobalOpts, detection_id: &str) -> Result<()> {
    let id = parse_detection_id(detection_id)?;

    // Listing never opens a payload, so no passphrase is needed
    let service = build_service(opts, None)?;
    let blocks = service
        .list_recoverable_blocks(id)
        .with_context(|| format!("Failed to list blocks of detection {id}"))?;

    if opts.json {
        return print_json(&blocks);
    }
    if opts.quiet {
        return Ok(());
    }

    if blocks.is_empty() {
        println!("No tampered blocks in detection {id}");
        return Ok(());
    }

    println!("Tampered blocks of detection {}", id.to_string().bold());
    println!();
    for block in &blocks {
        let b = block.bbox;
        let status = if block.has_original_data {
            "recoverable".green()
        } else {
            "no original data".red()
        };
        println!(
            "   {:>5}  {}x{} at ({}, {})  {}",
            block.block_index, b.width, b.height, b.x, b.y, status
        );
    }
    Ok(())
}
