//! Path skip rules and tracked-extension filtering
//!
//! This module decides which filesystem entries the watch pipeline ignores
//! before any event is constructed.

use glob::{MatchOptions, Pattern};
use livewatch_core::config::default_skip_patterns;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{trace, warn};

/// A single skip rule
#[derive(Debug, Clone)]
enum SkipRule {
    /// Glob matched against the whole `/`-normalized path
    Glob(Pattern),
    /// Plain substring of the `/`-normalized path
    Substring(String),
}

impl SkipRule {
    fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            warn!("Ignoring empty skip pattern");
            return None;
        }

        if !raw.contains(['*', '?', '[']) {
            return Some(Self::Substring(raw.to_string()));
        }

        match Pattern::new(raw) {
            Ok(pattern) => Some(Self::Glob(pattern)),
            Err(e) => {
                warn!("Skip pattern {raw:?} is not a valid glob ({e}), matching it as a substring");
                Some(Self::Substring(raw.to_string()))
            }
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Glob(pattern) => pattern.matches_with(path, MatchOptions::new()),
            Self::Substring(needle) => path.contains(needle.as_str()),
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Self::Glob(pattern) => pattern.as_str(),
            Self::Substring(needle) => needle,
        }
    }
}

/// Decides whether a filesystem entry should be ignored entirely
///
/// Rules containing `*`, `?` or `[` are globs, everything else is matched
/// as a substring of the path. Paths are compared with `/` separators on
/// every platform.
#[derive(Debug, Clone)]
pub struct PathFilter {
    rules: Arc<Vec<SkipRule>>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(default_skip_patterns())
    }
}

impl PathFilter {
    /// Compile a filter from skip patterns
    ///
    /// Malformed globs degrade to substring rules, so construction never fails.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .filter_map(|p| SkipRule::parse(p.as_ref()))
            .collect();

        Self {
            rules: Arc::new(rules),
        }
    }

    /// A filter that skips nothing
    pub fn empty() -> Self {
        Self {
            rules: Arc::new(Vec::new()),
        }
    }

    /// Check if a path should be skipped
    pub fn should_skip(&self, path: impl AsRef<Path>) -> bool {
        let normalized = normalize_separators(path.as_ref());
        match self.rules.iter().find(|rule| rule.matches(&normalized)) {
            Some(rule) => {
                trace!("Skipping {normalized:?} (rule {:?})", rule.as_str());
                true
            }
            None => false,
        }
    }

    /// The compiled rules, in configuration order
    pub fn rules(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(SkipRule::as_str)
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the filter has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Set of file extensions that produce events
///
/// An empty set tracks every file.
#[derive(Debug, Clone, Default)]
pub struct TrackedExtensions {
    extensions: Arc<HashSet<String>>,
}

impl TrackedExtensions {
    /// Create from extensions such as `"py"` or `".py"` (case-insensitive)
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        Self {
            extensions: Arc::new(extensions),
        }
    }

    /// Check whether a path carries a tracked extension
    pub fn matches(&self, path: impl AsRef<Path>) -> bool {
        if self.extensions.is_empty() {
            return true;
        }

        path.as_ref()
            .extension()
            .map(|ext| self.extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    /// Whether every extension is tracked
    pub fn tracks_all(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Render a path as a string with `/` separators
///
/// The pipeline already hands `should_skip` `/`-joined relative paths; this
/// is for callers of the public API passing native paths.
fn normalize_separators(path: &Path) -> String {
    let rendered = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        rendered.into_owned()
    } else {
        rendered.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
