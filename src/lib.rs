//! pullwarden: automated pull request review gate (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod approval;
pub mod config;
pub mod constants;
pub mod env;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod platform;
pub mod providers;
pub mod remediation;
pub mod retry;
