//! Shared types used across all modules.
//!
//! This module defines the pull request identity, changed-file and
//! context types, and the review result handed over by the external
//! reviewer. Other modules import from here rather than reaching into
//! each other's internals.

pub mod pull_request;
pub mod review;

pub use pull_request::{ChangedFile, ContentTier, FileStatus, HeadInfo, PrContext, PullRequestRef};
pub use review::{Issue, ReviewResult, Severity};
