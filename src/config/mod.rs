//! Configuration loading and layering.
//!
//! Handles `.pullwarden.toml` loading, environment variable resolution,
//! and CLI flag merging with proper priority ordering.

pub mod loader;

pub use loader::{
    ApprovalConfig, Config, ConfigError, FetchConfig, GithubConfig, RemediationConfig,
    RetryConfig, default_formatter,
};
