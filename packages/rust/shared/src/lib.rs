//! Shared types, error model, and configuration for Buildtrace.
//!
//! This crate is the foundation depended on by all other Buildtrace crates.
//! It provides:
//! - [`BuildtraceError`] — the unified error type
//! - Domain types ([`BuildRecord`], [`Stage`], [`LogLine`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlerConfig, LoggingConfig, ServerConfig, StorageConfig, TeamCityConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, teamcity_token,
};
pub use error::{BuildtraceError, Result};
pub use types::{BuildRecord, LogLine, Stage};
