//! Default values and functions for configuration

// Default constants
pub(crate) const DEFAULT_DEBOUNCE_MS: u64 = 1000;
pub(crate) const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;
pub(crate) const DEFAULT_TRACKED_EXTENSION: &str = "py";

pub(crate) fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

pub(crate) fn default_max_queue_size() -> usize {
    DEFAULT_MAX_QUEUE_SIZE
}

pub(crate) fn default_tracked_extensions() -> Vec<String> {
    vec![DEFAULT_TRACKED_EXTENSION.to_string()]
}

/// Skip patterns applied when none are configured
///
/// Entries containing `*`, `?` or `[` are treated as globs, everything else
/// as a plain substring of the path.
pub fn default_skip_patterns() -> Vec<String> {
    vec![
        // Version control
        "**/.git/**".to_string(),
        "**/.hg/**".to_string(),
        "**/.svn/**".to_string(),
        // Build output and dependencies
        "**/target/**".to_string(),
        "**/build/**".to_string(),
        "**/dist/**".to_string(),
        "**/node_modules/**".to_string(),
        // Python caches and virtualenvs
        "**/__pycache__/**".to_string(),
        "**/.pytest_cache/**".to_string(),
        "**/.mypy_cache/**".to_string(),
        "**/.tox/**".to_string(),
        "**/.venv/**".to_string(),
        "*.pyc".to_string(),
        "*.pyo".to_string(),
        // Editor temporaries and backups
        "*.swp".to_string(),
        "*.swo".to_string(),
        "*.tmp".to_string(),
        "*~".to_string(),
        "*.bak".to_string(),
        "*.orig".to_string(),
        ".DS_Store".to_string(),
    ]
}
