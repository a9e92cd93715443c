//! Miscellaneous shared helpers (config paths, error types).

pub mod config;
pub mod error;

pub use config::{config_dir, resolve_relative, PathChecks};
pub use error::ConfigError;
