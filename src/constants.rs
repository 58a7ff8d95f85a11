//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! pipeline limits and platform URLs so a rename only requires changing
//! this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "pullwarden";

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local config filename (e.g. `.pullwarden.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".pullwarden.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "pullwarden";

// ── Platform defaults ───────────────────────────────────────────────

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_RAW_URL: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_GIT_URL: &str = "https://github.com";

/// User agent sent with every API request (GitHub rejects requests without one).
pub const USER_AGENT: &str = concat!("pullwarden/", env!("CARGO_PKG_VERSION"));

// ── Pipeline limits ─────────────────────────────────────────────────

/// Maximum number of content resolutions in flight at once.
pub const MAX_CONCURRENT_FETCHES: usize = 5;

/// Files with this many added+removed lines or more are never fetched.
pub const MAX_FILE_CHANGES: u64 = 1000;

/// Total changed lines must stay below this for auto-approval.
pub const MAX_APPROVAL_CHANGED_LINES: u64 = 100;

/// Attempts (first try included) for every retried upstream call.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Base unit of the exponential back-off (`base * 2^attempt`).
pub const RETRY_BASE_DELAY_SECS: u64 = 1;

// ── Remediation defaults ────────────────────────────────────────────

pub const FIX_AUTHOR_NAME: &str = "pullwarden[bot]";
pub const FIX_AUTHOR_EMAIL: &str = "pullwarden[bot]@users.noreply.github.com";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_TOKEN: &str = "PULLWARDEN_TOKEN";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_API_URL: &str = "PULLWARDEN_API_URL";
pub const ENV_RAW_URL: &str = "PULLWARDEN_RAW_URL";
pub const ENV_GIT_URL: &str = "PULLWARDEN_GIT_URL";
pub const ENV_TRUSTED_AUTHORS: &str = "PULLWARDEN_TRUSTED_AUTHORS";
pub const ENV_FORMATTER: &str = "PULLWARDEN_FORMATTER";
