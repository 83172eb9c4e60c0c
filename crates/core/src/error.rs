use std::path::PathBuf;
use thiserror::Error;

/// Result type for livewatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for livewatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Workspace root is missing or not a directory
    #[error("Invalid workspace root: {} does not exist or is not a directory", .0.display())]
    InvalidRoot(PathBuf),

    /// `start` called on a session that is already watching
    #[error("Session is already watching")]
    AlreadyWatching,

    /// `start` called on a session that has been stopped
    #[error("Session has been stopped and cannot be restarted")]
    SessionStopped,

    /// Unknown event category name
    #[error("Invalid event category: {0}")]
    InvalidCategory(String),

    /// File watching errors
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Creates a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a watcher error
    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Creates an invalid root error
    pub fn invalid_root(path: impl Into<PathBuf>) -> Self {
        Self::InvalidRoot(path.into())
    }

    /// Creates an invalid category error
    pub fn invalid_category(name: impl Into<String>) -> Self {
        Self::InvalidCategory(name.into())
    }

    /// Adds context to any error
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

// Lets infallible conversions (e.g. `EventCategory` into itself) flow through
// APIs that accept `TryInto<EventCategory>`.
impl From<std::convert::Infallible> for Error {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::with_context(context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_root_message_includes_path() {
        let err = Error::invalid_root("/does/not/exist");
        assert!(err.to_string().contains("/does/not/exist"));
    }

    #[test]
    fn test_result_ext_wraps_source() {
        let io: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        ));
        let err = io.context("Failed to canonicalize root").unwrap_err();
        assert_eq!(err.to_string(), "Failed to canonicalize root: missing");
    }
}
