//! Verification and installation for keel
//!
//! This crate applies a resolved closure to a runtime installation:
//! - `verify`: detached ed25519 signature checks against the trust policy
//! - `installer`: content extraction, manifest files and uninstall
//! - `prepare`: writing features into a repository instead of a runtime
//! - `state`: the locked, persisted index of installed features
//! - `layout`, `product_info`: where things live in a runtime installation
//! - `engine`: the end-to-end pipeline from request to report

pub mod engine;
pub mod installer;
pub mod layout;
pub mod prepare;
pub mod product_info;
pub mod state;
pub mod verify;

// Re-export main types
pub use engine::{Engine, EngineMode, EngineOptions, ProductInfoOptions, UninstallReport};
pub use installer::Installer;
pub use layout::InstallLayout;
pub use prepare::Preparer;
pub use product_info::ProductInfo;
pub use state::{InstalledStateStore, StateGuard};
pub use verify::Verifier;

use keel_core::error::KeelError;

/// Result type for install operations
pub type InstallResult<T> = Result<T, KeelError>;
