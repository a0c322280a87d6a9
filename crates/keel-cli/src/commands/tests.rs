//! Unit tests for CLI commands.

use super::*;
use clap::Parser;
use keel_catalog::write_esa;
use keel_core::types::{FeatureManifest, Version};
use std::fs;
use tempfile::TempDir;

use crate::Cli;

/// Create a temporary directory for testing
fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test command context in a temporary directory
fn create_test_context(temp_dir: &TempDir) -> CommandContext {
    CommandContext {
        cwd: temp_dir.path().to_path_buf(),
        output: OutputHandler::new(),
        config: None,
        json: true,
    }
}

/// Repository with one feature `com.example.a-1.0`
fn publish(temp_dir: &TempDir) -> PathBuf {
    let repo = temp_dir.path().join("repo");
    fs::create_dir_all(&repo).unwrap();
    let manifest =
        FeatureManifest::new("com.example.a-1.0", "a-1.0", Version::new(1, 0, 0)).with_content("lib/a.jar");
    fs::write(repo.join("a.esa"), write_esa(&manifest, &[("lib/a.jar", b"jar")]).unwrap()).unwrap();
    repo
}

fn run_args() -> RunArgs {
    RunArgs {
        install_dir: Some(PathBuf::from("wlp")),
        from: Some(PathBuf::from("repo")),
        no_product_info: true,
        ..RunArgs::default()
    }
}

#[test]
fn test_cli_parses_shared_flags() {
    let cli = Cli::try_parse_from([
        "keel",
        "install",
        "servlet",
        "jsp",
        "--platform",
        "jakartaee-10.0,microProfile-6.1",
        "--install-dir",
        "wlp",
        "--verify",
        "warn",
        "--json",
    ])
    .unwrap();

    assert!(cli.json);
    match cli.command {
        Commands::Install { features, run } => {
            assert_eq!(features, vec!["servlet", "jsp"]);
            assert_eq!(run.platforms, vec!["jakartaee-10.0", "microProfile-6.1"]);
            assert_eq!(run.install_dir, Some(PathBuf::from("wlp")));
            assert_eq!(run.verify.as_deref(), Some("warn"));
        },
        _ => panic!("expected install"),
    }

    assert!(Cli::try_parse_from(["keel", "prepare", "a-1.0"]).is_err());
}

#[tokio::test]
async fn test_flags_override_config_file() {
    let temp_dir = create_temp_dir();
    fs::write(
        temp_dir.path().join("keel.toml"),
        "[server]\ninstall-dir = \"wlp\"\n[sources]\nfrom = \"repo\"\n[features]\nrequest = [\"a-1.0\"]\n",
    )
    .unwrap();
    let ctx = create_test_context(&temp_dir);

    let args = RunArgs {
        from: Some(PathBuf::from("elsewhere")),
        esa: vec![PathBuf::from("x.esa")],
        no_product_info: true,
        fail_on_unresolved: true,
        ..RunArgs::default()
    };
    let settings = load_settings(&args, &ctx).await.unwrap();

    assert_eq!(settings.options.install_dir, temp_dir.path().join("wlp"));
    assert_eq!(settings.options.from, Some(temp_dir.path().join("elsewhere")));
    assert_eq!(settings.options.esa_files, vec![temp_dir.path().join("x.esa")]);
    assert!(!settings.options.product_info.enabled);
    assert!(settings.fail_on_unresolved);
    assert_eq!(settings.request.tokens.len(), 1);
}

#[tokio::test]
async fn test_explicit_config_file() {
    let temp_dir = create_temp_dir();
    fs::create_dir_all(temp_dir.path().join("conf")).unwrap();
    fs::write(
        temp_dir.path().join("conf/custom.toml"),
        "[server]\ninstall-dir = \"../wlp\"\n",
    )
    .unwrap();
    let mut ctx = create_test_context(&temp_dir);
    ctx.config = Some(PathBuf::from("conf/custom.toml"));

    let settings = load_settings(&RunArgs::default(), &ctx).await.unwrap();
    assert_eq!(settings.options.install_dir, temp_dir.path().join("conf/../wlp"));
}

#[tokio::test]
async fn test_missing_install_dir_is_config_error() {
    let temp_dir = create_temp_dir();
    let ctx = create_test_context(&temp_dir);

    let result = load_settings(&RunArgs::default(), &ctx).await;
    assert!(matches!(result, Err(KeelError::ConfigValidation { .. })));
}

#[tokio::test]
async fn test_install_resolve_and_uninstall() {
    let temp_dir = create_temp_dir();
    publish(&temp_dir);
    let ctx = create_test_context(&temp_dir);
    let manifest = temp_dir
        .path()
        .join("wlp/usr/extension/lib/features/com.example.a-1.0.mf");

    let resolved = install::execute(vec!["a-1.0".to_string()], run_args(), EngineMode::DryRun, &ctx)
        .await
        .unwrap();
    assert!(resolved);
    assert!(!manifest.exists());

    let installed = install::execute(vec!["a-1.0".to_string()], run_args(), EngineMode::Install, &ctx)
        .await
        .unwrap();
    assert!(installed);
    assert!(manifest.is_file());

    let removed = uninstall::execute("a-1.0".to_string(), run_args(), &ctx).await.unwrap();
    assert!(removed);
    assert!(!manifest.exists());

    let again = uninstall::execute("a-1.0".to_string(), run_args(), &ctx).await;
    assert!(matches!(again, Err(KeelError::NotInstalled { .. })));
}

#[tokio::test]
async fn test_unresolved_fails_only_on_request() {
    let temp_dir = create_temp_dir();
    publish(&temp_dir);
    let ctx = create_test_context(&temp_dir);
    let features = vec!["a-1.0".to_string(), "missing-1.0".to_string()];

    let lenient = install::execute(features.clone(), run_args(), EngineMode::Install, &ctx)
        .await
        .unwrap();
    assert!(lenient);

    let strict = RunArgs {
        fail_on_unresolved: true,
        ..run_args()
    };
    assert!(!install::execute(features, strict, EngineMode::Install, &ctx).await.unwrap());
}

#[tokio::test]
async fn test_no_features_is_config_error() {
    let temp_dir = create_temp_dir();
    publish(&temp_dir);
    let ctx = create_test_context(&temp_dir);

    let result = install::execute(Vec::new(), run_args(), EngineMode::Install, &ctx).await;
    assert!(matches!(result, Err(KeelError::ConfigValidation { .. })));
}
