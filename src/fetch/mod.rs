//! Pull request context acquisition.
//!
//! [`fetcher::FileFetcher`] lists the changed files, decides which ones are
//! worth fetching, and resolves their content through the tiered
//! [`resolver::ContentResolver`] under a concurrency cap.

pub mod fetcher;
pub mod resolver;

use thiserror::Error;

use crate::constants::{MAX_CONCURRENT_FETCHES, MAX_FILE_CHANGES};
use crate::models::ChangedFile;
use crate::platform::PlatformError;

pub use fetcher::FileFetcher;
pub use resolver::{ContentResolver, ContentSource, Resolved};

/// Errors that abort context acquisition.
///
/// Only the changed-file listing is fatal; per-file failures degrade to
/// empty content.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to list changed files for {pr}: {source}")]
    FileList {
        pr: String,
        #[source]
        source: PlatformError,
    },
}

/// Limits applied while fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    /// Content resolutions allowed in flight at once.
    pub max_concurrent: usize,
    /// Files with this many added+removed lines or more are not fetched.
    pub max_file_changes: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: MAX_CONCURRENT_FETCHES,
            max_file_changes: MAX_FILE_CHANGES,
        }
    }
}

/// Extensions treated as source code.
const SOURCE_EXTENSIONS: &[&str] = &[
    "js", "jsx", "mjs", "cjs", "ts", "tsx", "mts", "cts", "vue", "svelte", "css", "scss", "sass",
    "less", "html", "rs", "go", "py", "rb", "java", "kt", "kts", "scala", "swift", "cs", "php",
    "ex", "exs", "c", "h", "cc", "cpp", "hpp", "m", "sh", "bash", "sql", "lua", "dart",
];

/// Lowercased extension of the last path component, if any.
pub(crate) fn extension(path: &str) -> Option<String> {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_lowercase()),
        _ => None,
    }
}

/// Whether `path` names a recognised source file.
pub fn is_source_file(path: &str) -> bool {
    extension(path).is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether a changed file's content should be fetched.
pub fn is_eligible(file: &ChangedFile, max_file_changes: u64) -> bool {
    is_source_file(&file.path) && file.total_changes() < max_file_changes
}
