//! PixelProof CLI - image tamper detection, localization and recovery.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;
use utils::GlobalOpts;

#[derive(Parser)]
#[command(name = "pixelproof")]
#[command(author, version, about = "Image tamper detection, localization and recovery", long_about = None)]
#[command(after_help = exit_codes::HELP)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding detection records
    #[arg(long, global = true, env = "PIXELPROOF_STORE", default_value = ".pixelproof")]
    store: PathBuf,

    /// Write visualizations of tampered images into this directory
    #[arg(long, global = true, value_name = "DIR")]
    artifacts: Option<PathBuf>,

    /// Print machine-readable JSON instead of the human summary
    #[arg(long, global = true)]
    json: bool,

    /// Suppress all non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// When to use colored output
    #[arg(long, global = true, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
}

#[derive(Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a keyed watermark into an image
    Embed {
        /// Image to watermark
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output path (png, bmp or tiff)
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        /// Watermark key
        #[arg(long, env = "PIXELPROOF_KEY", hide_env_values = true)]
        key: String,
    },

    /// Check an image against its keyed watermark
    Verify {
        /// Image to check
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Watermark key used at embedding time
        #[arg(long, env = "PIXELPROOF_KEY", hide_env_values = true)]
        key: String,
    },

    /// Compare a candidate image tile by tile against a trusted reference
    Compare {
        /// Trusted original
        #[arg(value_name = "REFERENCE")]
        reference: PathBuf,

        /// Image to check
        #[arg(value_name = "CANDIDATE")]
        candidate: PathBuf,

        /// Tile edge in pixels (default: 64)
        #[arg(long)]
        tile_size: Option<u32>,

        /// Per-tile difference threshold in [0, 1] (default: 0.1)
        #[arg(long)]
        threshold: Option<f64>,

        /// Passphrase sealing the original tiles for later recovery
        #[arg(long, env = "PIXELPROOF_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },

    /// Run the learned tamper detector
    Detect {
        /// Image to check
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Confidence threshold in (0, 1] (default: 0.5)
        #[arg(long)]
        confidence_threshold: Option<f64>,
    },

    /// List the recoverable blocks of a compare detection
    Blocks {
        /// Detection id printed by `compare`
        #[arg(value_name = "DETECTION_ID")]
        detection_id: String,
    },

    /// Restore original tiles of a compare detection
    Restore {
        /// Detection id printed by `compare`
        #[arg(value_name = "DETECTION_ID")]
        detection_id: String,

        /// Block indices to restore, comma-separated (default: all tampered)
        #[arg(long, value_delimiter = ',')]
        blocks: Vec<u32>,

        /// Passphrase used when the detection was created
        #[arg(long, env = "PIXELPROOF_PASSPHRASE", hide_env_values = true)]
        passphrase: String,

        /// Write each restored tile as block_<index>.png into this directory
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Paste restored tiles onto this image
        #[arg(long, value_name = "CANDIDATE", requires = "output")]
        apply: Option<PathBuf>,

        /// Where to write the repaired image
        #[arg(short, long, value_name = "OUTPUT", requires = "apply")]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOpts {
        store: cli.store,
        artifacts: cli.artifacts,
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Embed { input, output, key } => {
            commands::embed::execute(&opts, input, output, key)
        }
        Commands::Verify { image, key } => commands::verify::execute(&opts, image, key),
        Commands::Compare {
            reference,
            candidate,
            tile_size,
            threshold,
            passphrase,
        } => commands::compare::execute(
            &opts, reference, candidate, tile_size, threshold, passphrase,
        ),
        Commands::Detect {
            image,
            confidence_threshold,
        } => commands::detect::execute(&opts, image, confidence_threshold),
        Commands::Blocks { detection_id } => commands::blocks::execute(&opts, &detection_id),
        Commands::Restore {
            detection_id,
            blocks,
            passphrase,
            out_dir,
            apply,
            output,
        } => commands::restore::execute(
            &opts,
            &detection_id,
            blocks,
            passphrase,
            out_dir,
            apply.zip(output),
        ),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(exit_codes::USAGE_ERROR);
        }
        // --help and --version
        Err(e) => e.exit(),
    };

    match cli.color {
        ColorChoice::Always => colored::control::set_override(true),
        ColorChoice::Never => colored::control::set_override(false),
        ColorChoice::Auto => {}
    }
    init_tracing(cli.verbose, cli.quiet);

    let exit = match run(cli) {
        Ok(()) => ExitCode::success(),
        Err(err) => ExitCode::from_anyhow(&err),
    };

    if let Some(message) = &exit.message {
        eprintln!("{} {}", "error:".red().bold(), message);
    }
    std::process::exit(exit.code);
}
