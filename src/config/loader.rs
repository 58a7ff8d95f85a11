//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.pullwarden.toml` in the working directory
//! 4. `~/.config/pullwarden/config.toml` (global defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::approval::ApprovalSettings;
use crate::constants::{
    CONFIG_DIR, CONFIG_FILENAME, DEFAULT_API_URL, DEFAULT_GIT_URL, DEFAULT_RAW_URL,
    ENV_API_URL, ENV_FORMATTER, ENV_GIT_URL, ENV_GITHUB_TOKEN, ENV_RAW_URL, ENV_TOKEN,
    ENV_TRUSTED_AUTHORS, FIX_AUTHOR_EMAIL, FIX_AUTHOR_NAME, MAX_APPROVAL_CHANGED_LINES,
    MAX_CONCURRENT_FETCHES, MAX_FILE_CHANGES, RETRY_BASE_DELAY_SECS, RETRY_MAX_ATTEMPTS,
};
use crate::env::Env;
use crate::fetch::FetchSettings;
use crate::remediation::RemediationSettings;
use crate::retry::RetryPolicy;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Default formatter command line.
pub fn default_formatter() -> Vec<String> {
    ["npx", "prettier", "--write", "."]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GithubConfig,
    pub fetch: FetchConfig,
    pub retry: RetryConfig,
    pub approval: ApprovalConfig,
    pub remediation: RemediationConfig,
}

/// Code-host endpoints and credential.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    pub raw_url: String,
    /// Base URL for git remotes.
    pub git_url: String,
    pub token: Option<String>,
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("api_url", &self.api_url)
            .field("raw_url", &self.raw_url)
            .field("git_url", &self.git_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            raw_url: DEFAULT_RAW_URL.to_string(),
            git_url: DEFAULT_GIT_URL.to_string(),
            token: None,
        }
    }
}

/// Content fetching limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_concurrent: usize,
    pub max_file_changes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: MAX_CONCURRENT_FETCHES,
            max_file_changes: MAX_FILE_CHANGES,
        }
    }
}

/// Retry behaviour for upstream calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    /// Optional cap on total back-off time per operation.
    pub max_elapsed_secs: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS,
            base_delay_secs: RETRY_BASE_DELAY_SECS,
            max_elapsed_secs: None,
        }
    }
}

/// Auto-approval configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub enabled: bool,
    /// Empty disables the trusted-author check.
    pub trusted_authors: Vec<String>,
    pub max_changed_lines: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trusted_authors: Vec::new(),
            max_changed_lines: MAX_APPROVAL_CHANGED_LINES,
        }
    }
}

/// Auto-fix configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    pub enabled: bool,
    pub formatter: Vec<String>,
    pub author_name: String,
    pub author_email: String,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            formatter: default_formatter(),
            author_name: FIX_AUTHOR_NAME.to_string(),
            author_email: FIX_AUTHOR_EMAIL.to_string(),
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, repo-local config, then applies
    /// environment variable overrides.
    pub fn load(repo_root: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // Layer 4: global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        // Layer 3: repo-local config
        if let Some(root) = repo_root {
            let local_path = root.join(CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        // Layer 2: environment variables
        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one; only values that differ from
    /// the defaults override.
    fn merge(&mut self, other: Config) {
        let github = GithubConfig::default();
        if other.github.api_url != github.api_url {
            self.github.api_url = other.github.api_url;
        }
        if other.github.raw_url != github.raw_url {
            self.github.raw_url = other.github.raw_url;
        }
        if other.github.git_url != github.git_url {
            self.github.git_url = other.github.git_url;
        }
        if other.github.token.is_some() {
            self.github.token = other.github.token;
        }

        let fetch = FetchConfig::default();
        if other.fetch.max_concurrent != fetch.max_concurrent {
            self.fetch.max_concurrent = other.fetch.max_concurrent;
        }
        if other.fetch.max_file_changes != fetch.max_file_changes {
            self.fetch.max_file_changes = other.fetch.max_file_changes;
        }

        let retry = RetryConfig::default();
        if other.retry.max_attempts != retry.max_attempts {
            self.retry.max_attempts = other.retry.max_attempts;
        }
        if other.retry.base_delay_secs != retry.base_delay_secs {
            self.retry.base_delay_secs = other.retry.base_delay_secs;
        }
        if other.retry.max_elapsed_secs.is_some() {
            self.retry.max_elapsed_secs = other.retry.max_elapsed_secs;
        }

        // Disabled overrides enabled
        if !other.approval.enabled {
            self.approval.enabled = false;
        }
        if !other.approval.trusted_authors.is_empty() {
            self.approval.trusted_authors = other.approval.trusted_authors;
        }
        if other.approval.max_changed_lines != ApprovalConfig::default().max_changed_lines {
            self.approval.max_changed_lines = other.approval.max_changed_lines;
        }

        let remediation = RemediationConfig::default();
        if other.remediation.enabled {
            self.remediation.enabled = true;
        }
        if other.remediation.formatter != remediation.formatter {
            self.remediation.formatter = other.remediation.formatter;
        }
        if other.remediation.author_name != remediation.author_name {
            self.remediation.author_name = other.remediation.author_name;
        }
        if other.remediation.author_email != remediation.author_email {
            self.remediation.author_email = other.remediation.author_email;
        }
    }

    /// Apply environment variable overrides.
    fn apply_env_vars(&mut self, env: &Env) {
        if let Some(token) = env.first_of(&[ENV_TOKEN, ENV_GITHUB_TOKEN]) {
            self.github.token = Some(token);
        }
        if let Some(val) = env.non_empty(ENV_API_URL) {
            self.github.api_url = val;
        }
        if let Some(val) = env.non_empty(ENV_RAW_URL) {
            self.github.raw_url = val;
        }
        if let Some(val) = env.non_empty(ENV_GIT_URL) {
            self.github.git_url = val;
        }
        if let Some(val) = env.non_empty(ENV_TRUSTED_AUTHORS) {
            self.approval.trusted_authors = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = env.non_empty(ENV_FORMATTER) {
            self.remediation.formatter = val.split_whitespace().map(String::from).collect();
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_secs(self.retry.base_delay_secs),
            max_elapsed: self.retry.max_elapsed_secs.map(Duration::from_secs),
        }
    }

    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            max_concurrent: self.fetch.max_concurrent,
            max_file_changes: self.fetch.max_file_changes,
        }
    }

    pub fn approval_settings(&self) -> ApprovalSettings {
        ApprovalSettings {
            enabled: self.approval.enabled,
            trusted_authors: self.approval.trusted_authors.clone(),
            max_changed_lines: self.approval.max_changed_lines,
        }
    }

    pub fn remediation_settings(&self) -> RemediationSettings {
        RemediationSettings {
            git_url: self.github.git_url.clone(),
            token: self.github.token.clone(),
            formatter: self.remediation.formatter.clone(),
            author_name: self.remediation.author_name.clone(),
            author_email: self.remediation.author_email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn no_env() -> Env {
        Env::mock(Vec::<(&str, &str)>::new())
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.fetch.max_concurrent, 5);
        assert_eq!(config.fetch.max_file_changes, 1000);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.approval.enabled);
        assert!(config.approval.trusted_authors.is_empty());
        assert!(!config.remediation.enabled);
        assert_eq!(config.remediation.formatter, ["npx", "prettier", "--write", "."]);
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[github]
api_url = "https://ghe.example.com/api/v3"

[fetch]
max_concurrent = 2

[retry]
max_elapsed_secs = 30

[approval]
trusted_authors = ["alice", "bob"]

[remediation]
enabled = true
formatter = ["cargo", "fmt"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.api_url, "https://ghe.example.com/api/v3");
        assert_eq!(config.github.raw_url, "https://raw.githubusercontent.com");
        assert_eq!(config.fetch.max_concurrent, 2);
        assert_eq!(config.fetch.max_file_changes, 1000);
        assert_eq!(config.retry.max_elapsed_secs, Some(30));
        assert_eq!(config.approval.trusted_authors, ["alice", "bob"]);
        assert!(config.remediation.enabled);
        assert_eq!(config.remediation.formatter, ["cargo", "fmt"]);
    }

    #[test]
    fn merge_overrides_non_default_values() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.github.token = Some("ghp_file".into());
        other.fetch.max_concurrent = 8;
        other.approval.enabled = false;
        other.approval.trusted_authors = vec!["carol".into()];
        other.remediation.enabled = true;

        base.merge(other);

        assert_eq!(base.github.token.as_deref(), Some("ghp_file"));
        assert_eq!(base.fetch.max_concurrent, 8);
        assert!(!base.approval.enabled);
        assert_eq!(base.approval.trusted_authors, ["carol"]);
        assert!(base.remediation.enabled);
    }

    #[test]
    fn merge_keeps_base_when_other_is_default() {
        let mut base = Config::default();
        base.fetch.max_concurrent = 3;
        base.approval.trusted_authors = vec!["dave".into()];

        base.merge(Config::default());

        assert_eq!(base.fetch.max_concurrent, 3);
        assert_eq!(base.approval.trusted_authors, ["dave"]);
    }

    #[test]
    fn load_file_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid {{ toml").unwrap();
        let err = Config::load_file(&path).unwrap_err();
        assert!(err.to_string().contains("parse"));
    }

    #[test]
    fn load_file_not_found() {
        let err = Config::load_file(Path::new("/tmp/pullwarden_no_such_config.toml")).unwrap_err();
        assert!(err.to_string().contains("read"));
    }

    #[test]
    fn load_from_repo_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".pullwarden.toml"),
            "[approval]\nmax_changed_lines = 50\n",
        )
        .unwrap();
        let config = Config::load(Some(dir.path()), &no_env()).unwrap();
        assert_eq!(config.approval.max_changed_lines, 50);
    }

    #[test]
    fn token_env_precedence() {
        let env = Env::mock([("PULLWARDEN_TOKEN", "primary"), ("GITHUB_TOKEN", "fallback")]);
        let mut config = Config::default();
        config.github.token = Some("from-file".into());
        config.apply_env_vars(&env);
        assert_eq!(config.github.token.as_deref(), Some("primary"));

        let env = Env::mock([("GITHUB_TOKEN", "fallback")]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.github.token.as_deref(), Some("fallback"));
    }

    #[test]
    fn list_env_vars_are_split() {
        let env = Env::mock([
            ("PULLWARDEN_TRUSTED_AUTHORS", "alice, bob,,carol "),
            ("PULLWARDEN_FORMATTER", "cargo  fmt --all"),
            ("PULLWARDEN_API_URL", "http://localhost:9000"),
        ]);
        let mut config = Config::default();
        config.apply_env_vars(&env);
        assert_eq!(config.approval.trusted_authors, ["alice", "bob", "carol"]);
        assert_eq!(config.remediation.formatter, ["cargo", "fmt", "--all"]);
        assert_eq!(config.github.api_url, "http://localhost:9000");
    }

    #[test]
    fn settings_are_derived() {
        let mut config = Config::default();
        config.retry.max_elapsed_secs = Some(10);
        config.github.token = Some("t".into());

        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_elapsed, Some(Duration::from_secs(10)));
        assert_eq!(config.fetch_settings(), FetchSettings::default());
        assert_eq!(config.approval_settings(), ApprovalSettings::default());
        let remediation = config.remediation_settings();
        assert_eq!(remediation.token.as_deref(), Some("t"));
        assert_eq!(remediation.git_url, "https://github.com");
    }

    #[test]
    fn token_is_redacted_in_debug() {
        let mut config = Config::default();
        config.github.token = Some("ghp_super_secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("ghp_super_secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
