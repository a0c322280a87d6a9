//! # keel-cli
//!
//! Command line front end for the keel feature installer.
//!
//! Builds a resolution request from keel.toml, `KEEL_*` environment
//! variables and flags, runs the engine and prints the resulting report.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use keel_core::error::KeelError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Resolve and install runtime features
#[derive(Parser)]
#[command(name = "keel", version, about = "Resolve and install runtime features")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file instead of the nearest keel.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve and install features
    Install {
        #[arg(value_name = "FEATURE")]
        features: Vec<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Resolve, fetch and verify without installing anything
    Resolve {
        #[arg(value_name = "FEATURE")]
        features: Vec<String>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Copy the resolved features into a directory repository
    Prepare {
        #[arg(value_name = "FEATURE")]
        features: Vec<String>,
        /// Repository root to write
        #[arg(long, value_name = "DIR")]
        repo: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Remove a feature keel installed
    Uninstall {
        feature: String,
        #[arg(long, value_name = "DIR")]
        install_dir: Option<PathBuf>,
    },
}

/// Flags shared by the resolving commands; each overrides keel.toml
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Runtime installation directory
    #[arg(long, value_name = "DIR")]
    pub install_dir: Option<PathBuf>,

    /// Directory repository to install from
    #[arg(long, value_name = "DIR")]
    pub from: Option<PathBuf>,

    /// Local ESA file (repeatable)
    #[arg(long, value_name = "FILE")]
    pub esa: Vec<PathBuf>,

    /// Remote repository base URL
    #[arg(long, value_name = "URL")]
    pub remote: Option<String>,

    #[arg(long, value_name = "VERSION")]
    pub runtime_version: Option<String>,

    /// `usr` or `extension:<name>`
    #[arg(long, value_name = "TARGET")]
    pub target: Option<String>,

    /// Signature policy: none, warn or enforce
    #[arg(long, value_name = "POLICY")]
    pub verify: Option<String>,

    /// Platform to resolve versionless features against
    #[arg(long = "platform", value_name = "PLATFORM", value_delimiter = ',')]
    pub platforms: Vec<String>,

    #[arg(long)]
    pub accept_license: bool,

    #[arg(long, value_name = "N")]
    pub fetch_workers: Option<usize>,

    /// Exit with failure when any feature does not resolve
    #[arg(long)]
    pub fail_on_unresolved: bool,

    /// Skip the `productInfo featureInfo` query
    #[arg(long)]
    pub no_product_info: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    setup_panic_handler();

    info!("Starting keel v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            let formatter = ErrorFormatter::new();
            match err.downcast_ref::<KeelError>() {
                Some(keel) => eprint!("{}", formatter.format_error(keel)),
                None => eprintln!("{}", formatter.format_simple(&format!("{:#}", err))),
            }
            ExitCode::from(2)
        },
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<bool> {
    // Create Tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;

    rt.block_on(async {
        let ctx = CommandContext::new(cli.config, cli.json)?;
        Ok(commands::dispatch_command(cli.command, &ctx).await?)
    })
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "keel={0},keel_core={0},keel_config={0},keel_catalog={0},keel_resolver={0},keel_install={0}",
            level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("keel encountered an unexpected error: {}", panic_info);
        eprintln!("keel crashed! This is a bug.");
        eprintln!("Error: {}", panic_info);
    }));
}
