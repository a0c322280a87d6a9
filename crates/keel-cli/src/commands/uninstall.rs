//! `keel uninstall` command implementation.

use keel_core::error::{KeelError, KeelResult};
use keel_install::Engine;

use super::{load_settings, CommandContext};
use crate::RunArgs;

/// Remove one recorded feature; modified files are kept and listed
pub async fn execute(feature: String, args: RunArgs, ctx: &CommandContext) -> KeelResult<bool> {
    let settings = load_settings(&args, ctx).await?;
    let engine = Engine::new(settings.options);

    let report = engine.uninstall(&feature)?;

    if ctx.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| {
            KeelError::io(
                "Failed to serialize report".to_string(),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;
        println!("{}", json);
        return Ok(true);
    }

    for path in &report.modified {
        ctx.output.warn(&format!("Kept {} because it changed since installation", path));
    }
    ctx.output.success(&format!(
        "Removed {} ({} files)",
        report.symbolic_name,
        report.removed.len()
    ));
    Ok(true)
}
