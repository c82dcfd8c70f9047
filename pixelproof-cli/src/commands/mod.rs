//! Subcommand implementations.

pub mod blocks;
pub mod compare;
pub mod detect;
pub mod embed;
pub mod restore;
pub mod verify;

use anyhow::{bail, Result};
use colored::Colorize;
use pixelproof_core::{DetectionOutcome, DetectionParams, Diagnostic};
use serde_json::json;

use crate::utils::{print_json, GlobalOpts};

/// Print the AUTHENTIC / TAMPERED banner.
pub fn print_verdict(tampered: bool) {
    println!();
    if tampered {
        println!("{}", "╔════════════════════════════════════════╗".red());
        println!("{}", "║              TAMPERED                  ║".red().bold());
        println!("{}", "╚════════════════════════════════════════╝".red());
    } else {
        println!("{}", "╔════════════════════════════════════════╗".green());
        println!("{}", "║              AUTHENTIC                 ║".green().bold());
        println!("{}", "╚════════════════════════════════════════╝".green());
    }
    println!();
}

/// Print the fields every detection shares, then its diagnostics.
pub fn print_outcome_summary(outcome: &DetectionOutcome) {
    let result = &outcome.result;
    println!("   {} {}", "Detection:".dimmed(), result.id);
    println!("   {} {}", "Strategy:".dimmed(), result.strategy);
    if let DetectionParams::Model { backend, .. } = &result.params {
        println!("   {} {}", "Backend:".dimmed(), backend);
    }
    println!("   {} {:.4}", "Tamper ratio:".dimmed(), result.tamper_ratio);
    if let Some(confidence) = result.confidence {
        println!("   {} {:.4}", "Confidence:".dimmed(), confidence);
    }
    println!("   {} {}", "Regions:".dimmed(), result.regions.len());
    for region in &result.regions {
        let b = region.bbox;
        println!(
            "     {} {}x{} at ({}, {})",
            "-".dimmed(),
            b.width,
            b.height,
            b.x,
            b.y
        );
    }
    if let Some(path) = &result.visualization {
        println!("   {} {}", "Visualization:".dimmed(), path);
    }
    for diagnostic in &outcome.diagnostics {
        let note = match diagnostic {
            Diagnostic::DetectorSubstituted { reason } => {
                format!("detector replaced by placeholder ({reason})")
            }
            Diagnostic::VisualizationFailed { reason } => {
                format!("visualization skipped ({reason})")
            }
        };
        println!("   {} {}", "Note:".yellow(), note);
    }
}

/// Emit the outcome in the requested form.
pub fn print_report(opts: &GlobalOpts, outcome: &DetectionOutcome) -> Result<()> {
    if opts.json {
        print_json(&json!({
            "result": outcome.result,
            "blocks": outcome.blocks,
            "diagnostics": outcome.diagnostics,
        }))?;
    } else if !opts.quiet {
        print_verdict(outcome.result.is_tampered);
        print_outcome_summary(outcome);
    }
    Ok(())
}

/// Turn a tampered verdict into a verification failure.
pub fn verdict(outcome: &DetectionOutcome) -> Result<()> {
    if outcome.result.is_tampered {
        bail!(
            "Verification failed: image has been tampered (ratio {:.4})",
            outcome.result.tamper_ratio
        );
    }
    Ok(())
}
