//! Embed command implementation.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use pixelproof_core::watermark::{self, WatermarkKey};
use pixelproof_core::DetectionConfig;
use serde_json::json;
use tracing::info;

use crate::utils::{ensure_lossless, load_image, print_json, save_image, GlobalOpts};

/// Execute the embed command.
pub fn execute(opts: &GlobalOpts, input: PathBuf, output: PathBuf, key: String) -> Result<()> {
    // Checked before any work so a lossy target never gets written
    ensure_lossless(&output)?;

    let image = load_image(&input)?;
    let key = WatermarkKey::new(key.into_bytes());
    let channel = DetectionConfig::from_env().lsb_channel;

    let marked = watermark::embed(&image, &key, channel);
    save_image(&marked, &output)?;

    let digest = key.digest_hex();
    info!(output = %output.display(), key_digest = &digest[..16], "Watermark embedded");

    if opts.json {
        print_json(&json!({
            "input": input,
            "output": output,
            "channel": channel,
            "key_digest": digest,
            "width": marked.width(),
            "height": marked.height(),
        }))?;
    } else if !opts.quiet {
        println!("{} Watermark embedded", "✓".green().bold());
        println!("   {} {}", "Output:".dimmed(), output.display());
        println!("   {} {}", "Channel:".dimmed(), channel);
        println!("   {} {}...", "Key digest:".dimmed(), &digest[..16]);
    }
    Ok(())
}
