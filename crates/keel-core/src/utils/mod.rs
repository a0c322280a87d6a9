//! Utility functions and helpers.
//!
//! Common functionality used across multiple keel crates.

pub mod hash;
pub mod path;

// Re-export commonly used utilities
pub use hash::{blake3_hash, blake3_hash_file};
pub use path::{is_safe_path, normalize_path, safe_join};
