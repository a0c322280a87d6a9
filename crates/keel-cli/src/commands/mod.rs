//! Command implementations and dispatch logic.
//!
//! Every resolving command goes through [`load_settings`]: keel.toml (or
//! the file named by `--config`), then `KEEL_*` variables, then flags.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use keel_config::{ConfigLayering, ConfigLoader, ConfigSource, KeelToml, Settings};
use keel_core::error::{KeelError, KeelResult};
use keel_install::EngineMode;
use tracing::info;

pub mod install;
pub mod uninstall;

#[cfg(test)]
mod tests;

use crate::output::OutputHandler;
use crate::{Commands, RunArgs};

/// Shared context for all commands
pub struct CommandContext {
    pub cwd: PathBuf,
    pub output: OutputHandler,
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    /// Print machine-readable output
    pub json: bool,
}

impl CommandContext {
    /// Create a new command context
    pub fn new(config: Option<PathBuf>, json: bool) -> KeelResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| KeelError::io("Failed to get current directory".to_string(), e))?;

        Ok(Self {
            cwd,
            output: OutputHandler::new(),
            config,
            json,
        })
    }
}

/// Dispatch a command to its handler; `false` means a failed run
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> KeelResult<bool> {
    match command {
        Commands::Install { features, run } => {
            info!("Installing features: {:?}", features);
            install::execute(features, run, EngineMode::Install, ctx).await
        },
        Commands::Resolve { features, run } => {
            info!("Resolving features (dry run): {:?}", features);
            install::execute(features, run, EngineMode::DryRun, ctx).await
        },
        Commands::Prepare { features, repo, run } => {
            let repo_root = absolute(&ctx.cwd, &repo);
            info!("Preparing features into {}", repo_root.display());
            install::execute(features, run, EngineMode::Prepare { repo_root }, ctx).await
        },
        Commands::Uninstall { feature, install_dir } => {
            info!("Uninstalling feature: {}", feature);
            let run = RunArgs {
                install_dir,
                ..RunArgs::default()
            };
            uninstall::execute(feature, run, ctx).await
        },
    }
}

/// Layer configuration file, environment and flags into settings
pub async fn load_settings(args: &RunArgs, ctx: &CommandContext) -> KeelResult<Settings> {
    let cwd = utf8(ctx.cwd.clone())?;
    let loader = ConfigLoader::new(cwd.clone());

    let loaded = match &ctx.config {
        Some(path) => Some(loader.load_explicit(&utf8(path.clone())?).await?),
        None => loader.load_project_config().await?,
    };
    // Without a file, flags or KEEL_INSTALL_DIR must name the installation
    let (config, source) = loaded.unwrap_or_else(|| (KeelToml::default(), ConfigSource::CommandLine));

    let merged = ConfigLayering::merge_configs(
        config,
        ConfigLayering::collect_env_overrides(),
        cli_overrides(args, &ctx.cwd),
    )?;

    let mut settings = Settings::from_config(&merged, source.base_dir(&cwd).as_std_path())?;
    settings
        .options
        .esa_files
        .extend(args.esa.iter().map(|path| absolute(&ctx.cwd, path)));
    if args.no_product_info {
        settings.options.product_info.enabled = false;
    }
    settings.fail_on_unresolved |= args.fail_on_unresolved;
    Ok(settings)
}

/// Flags as configuration overrides; paths are made absolute against the
/// working directory so they are not reinterpreted relative to keel.toml
fn cli_overrides(args: &RunArgs, cwd: &Path) -> HashMap<String, String> {
    let mut overrides = HashMap::new();
    let path = |p: &PathBuf| absolute(cwd, p).display().to_string();

    if let Some(dir) = &args.install_dir {
        overrides.insert("install-dir".to_string(), path(dir));
    }
    if let Some(from) = &args.from {
        overrides.insert("from".to_string(), path(from));
    }
    if let Some(remote) = &args.remote {
        overrides.insert("remote".to_string(), remote.clone());
    }
    if let Some(version) = &args.runtime_version {
        overrides.insert("runtime-version".to_string(), version.clone());
    }
    if let Some(target) = &args.target {
        overrides.insert("target".to_string(), target.clone());
    }
    if let Some(verify) = &args.verify {
        overrides.insert("verify".to_string(), verify.clone());
    }
    if !args.platforms.is_empty() {
        overrides.insert("platforms".to_string(), args.platforms.join(","));
    }
    if args.accept_license {
        overrides.insert("accept-license".to_string(), "true".to_string());
    }
    if let Some(workers) = args.fetch_workers {
        overrides.insert("fetch-workers".to_string(), workers.to_string());
    }
    overrides
}

fn absolute(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

fn utf8(path: PathBuf) -> KeelResult<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|p| KeelError::config("path", format!("{} is not valid UTF-8", p.display())))
}
