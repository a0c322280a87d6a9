//! `keel install`, `keel resolve` and `keel prepare`.
//!
//! All three resolve the same way and differ only in the engine mode.

use std::time::Instant;

use keel_core::error::{KeelError, KeelResult};
use keel_core::types::ResolutionReport;
use keel_install::{Engine, EngineMode};

use super::{load_settings, CommandContext};
use crate::RunArgs;

/// Execute a resolving command; returns whether the run succeeded
pub async fn execute(
    features: Vec<String>,
    args: RunArgs,
    mode: EngineMode,
    ctx: &CommandContext,
) -> KeelResult<bool> {
    let start_time = Instant::now();

    let settings = load_settings(&args, ctx).await?.with_tokens(features);
    settings.require_features()?;

    let mut options = settings.options.clone();
    options.mode = mode.clone();
    let engine = Engine::new(options);

    if !ctx.json {
        let verb = match mode {
            EngineMode::Install => "Installing",
            EngineMode::DryRun => "Resolving",
            EngineMode::Prepare { .. } => "Preparing",
        };
        let tokens: Vec<&str> = settings.request.tokens.iter().map(|t| t.as_str()).collect();
        ctx.output.info(&format!(
            "{} {} into {}",
            verb,
            tokens.join(", "),
            engine.options().install_dir.display()
        ));
    }

    let report = engine.run(&settings.request).await?;
    let succeeded = succeeded(&report, settings.fail_on_unresolved);

    if ctx.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| {
            KeelError::io(
                "Failed to serialize report".to_string(),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;
        println!("{}", json);
    } else {
        ctx.output.report(&report);
        let elapsed = start_time.elapsed();
        if succeeded {
            ctx.output.success(&format!("Done in {:.2}s", elapsed.as_secs_f64()));
        } else {
            ctx.output.error(&format!("Finished with failures in {:.2}s", elapsed.as_secs_f64()));
        }
    }

    Ok(succeeded)
}

/// A run fails when a feature was rejected or failed to install, or when
/// a token did not resolve and the caller asked for that to count.
/// Version conflicts are reported but keep the installed version working.
pub fn succeeded(report: &ResolutionReport, fail_on_unresolved: bool) -> bool {
    report.rejected().is_empty()
        && report.failed().is_empty()
        && (!fail_on_unresolved || report.unresolved.is_empty())
}
