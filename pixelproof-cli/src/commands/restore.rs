//! Restore command implementation.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use colored::Colorize;
use pixelproof_core::recovery::decode_tile;
use pixelproof_core::{apply_restored_blocks, BoundingBox, RestoredBlock};
use serde::Serialize;
use tracing::info;

use crate::utils::{
    build_service, load_image, parse_detection_id, print_json, save_image, GlobalOpts,
};

/// JSON view of a restored block; tile bytes are base64 PNG.
#[derive(Serialize)]
struct RestoredBlockView<'a> {
    block_index: u32,
    bbox: Option<BoundingBox>,
    available: bool,
    block_data: Option<String>,
    path: Option<&'a Path>,
}

/// Execute the restore command.
pub fn execute(
    opts: &GlobalOpts,
    detection_id: &str,
    blocks: Vec<u32>,
    passphrase: String,
    out_dir: Option<PathBuf>,
    apply: Option<(PathBuf, PathBuf)>,
) -> Result<()> {
    let id = parse_detection_id(detection_id)?;
    if out_dir.is_none() && apply.is_none() && !opts.json {
        bail!("Nothing to do: pass --out-dir, --apply with --output, or --json");
    }

    let service = build_service(opts, Some(&passphrase))?;
    let restored = service
        .restore_blocks(id, &blocks)
        .with_context(|| format!("Failed to restore blocks of detection {id}"))?;

    let mut written = Vec::with_capacity(restored.len());
    for block in &restored {
        let path = match (&out_dir, &block.block_data) {
            (Some(dir), Some(data)) => Some(write_tile(dir, block.block_index, data)?),
            _ => None,
        };
        written.push(path);
    }

    if let Some((candidate_path, output)) = &apply {
        let candidate = load_image(candidate_path)?;
        let repaired = apply_restored_blocks(&candidate, &restored)?;
        save_image(&repaired, output)?;
    }

    let available = restored.iter().filter(|b| b.is_available()).count();
    info!(%id, requested = restored.len(), available, "Restore finished");

    if opts.json {
        let views: Vec<RestoredBlockView<'_>> = restored
            .iter()
            .zip(&written)
            .map(|(block, path)| view(block, path.as_deref()))
            .collect();
        return print_json(&views);
    }
    if opts.quiet {
        return Ok(());
    }

    println!(
        "{} Restored {} of {} block(s)",
        "✓".green().bold(),
        available,
        restored.len()
    );
    for (block, path) in restored.iter().zip(&written) {
        match (block.is_available(), path) {
            (true, Some(path)) => println!(
                "   {:>5}  {}",
                block.block_index,
                path.display().to_string().green()
            ),
            (true, None) => println!("   {:>5}  {}", block.block_index, "restored".green()),
            (false, _) => println!("   {:>5}  {}", block.block_index, "not available".red()),
        }
    }
    if let Some((_, output)) = &apply {
        println!("   {} {}", "Repaired image:".dimmed(), output.display());
    }
    Ok(())
}

fn write_tile(dir: &Path, block_index: u32, data: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to write tiles: {}", dir.display()))?;
    // Decode first so a corrupt tile never lands on disk
    decode_tile(data)?;
    let path = dir.join(format!("block_{block_index}.png"));
    std::fs::write(&path, data)
        .with_context(|| format!("Failed to write tile: {}", path.display()))?;
    Ok(path)
}

fn view<'a>(block: &RestoredBlock, path: Option<&'a Path>) -> RestoredBlockView<'a> {
    RestoredBlockView {
        block_index: block.block_index,
        bbox: block.bbox,
        available: block.is_available(),
        block_data: block.block_data.as_deref().map(|data| BASE64.encode(data)),
        path,
    }
}
