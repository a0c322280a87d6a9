//! Configuration parsing for keel
//!
//! This crate handles parsing and validation of keel.toml, layering of
//! environment and command line overrides, and conversion of the result
//! into a resolution request plus engine options.

pub mod merge;
pub mod settings;
pub mod toml;

// Re-export main types
pub use self::merge::{ConfigLayering, ConfigLoader, ConfigSource};
pub use self::settings::Settings;
pub use self::toml::{
    FeaturesSection, KeelToml, ProductInfoSection, ServerSection, SourcesSection, VerificationSection,
};

use keel_core::error::KeelError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, KeelError>;
