//! File change event types and subscription categories
//!
//! This module defines the immutable event value delivered to subscribers
//! and the closed set of categories subscribers register against.

use livewatch_core::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Kind of change observed for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    /// File contents were modified
    Modified,
    /// File was created
    Created,
    /// File was deleted
    Deleted,
    /// File was renamed or moved
    Moved,
}

impl ChangeType {
    /// The category events of this type are delivered on
    pub fn category(self) -> EventCategory {
        match self {
            Self::Modified => EventCategory::FileChanged,
            Self::Created => EventCategory::FileCreated,
            Self::Deleted => EventCategory::FileDeleted,
            Self::Moved => EventCategory::FileMoved,
        }
    }
}

/// Category a subscriber registers against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    FileChanged,
    FileCreated,
    FileDeleted,
    FileMoved,
}

impl EventCategory {
    /// Every category, in declaration order
    pub const ALL: [EventCategory; 4] = [
        Self::FileChanged,
        Self::FileCreated,
        Self::FileDeleted,
        Self::FileMoved,
    ];

    /// Canonical name of the category
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileChanged => "FileChanged",
            Self::FileCreated => "FileCreated",
            Self::FileDeleted => "FileDeleted",
            Self::FileMoved => "FileMoved",
        }
    }

    /// The change type carried by events of this category
    pub fn change_type(self) -> ChangeType {
        match self {
            Self::FileChanged => ChangeType::Modified,
            Self::FileCreated => ChangeType::Created,
            Self::FileDeleted => ChangeType::Deleted,
            Self::FileMoved => ChangeType::Moved,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = Error;

    /// Accepts `FileChanged`, `file_changed` and `file-changed`, ignoring case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "filechanged" => Ok(Self::FileChanged),
            "filecreated" => Ok(Self::FileCreated),
            "filedeleted" => Ok(Self::FileDeleted),
            "filemoved" => Ok(Self::FileMoved),
            _ => Err(Error::invalid_category(s)),
        }
    }
}

impl TryFrom<&str> for EventCategory {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for EventCategory {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A classified change to a file under the workspace root
///
/// Events are plain values: two events with the same fields are equal, and
/// equal events may legitimately be delivered more than once over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    /// Path relative to the workspace root, `/`-separated
    pub relative_path: String,
    /// Kind of change
    pub change_type: ChangeType,
    /// When the event was constructed
    pub timestamp: SystemTime,
    /// Relative source path of a move, when the OS reported both ends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
}

impl FileChangeEvent {
    /// Create an event stamped with the current time
    pub fn new(relative_path: impl Into<String>, change_type: ChangeType) -> Self {
        Self {
            relative_path: relative_path.into(),
            change_type,
            timestamp: SystemTime::now(),
            previous_path: None,
        }
    }

    /// Override the timestamp
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Record the source path of a move
    pub fn with_previous_path(mut self, previous_path: impl Into<String>) -> Self {
        self.previous_path = Some(previous_path.into());
        self
    }

    /// The category this event is dispatched on
    pub fn category(&self) -> EventCategory {
        self.change_type.category()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_category_parsing_accepts_common_spellings() {
        assert_eq!(
            "FileChanged".parse::<EventCategory>().expect("parse"),
            EventCategory::FileChanged
        );
        assert_eq!(
            "file_created".parse::<EventCategory>().expect("parse"),
            EventCategory::FileCreated
        );
        assert_eq!(
            "file-deleted".parse::<EventCategory>().expect("parse"),
            EventCategory::FileDeleted
        );
        assert_eq!(
            EventCategory::try_from("FILEMOVED").expect("parse"),
            EventCategory::FileMoved
        );
    }

    #[test]
    fn test_category_parsing_rejects_unknown() {
        let err = "FileRenamed".parse::<EventCategory>().unwrap_err();
        assert!(matches!(err, Error::InvalidCategory(name) if name == "FileRenamed"));
    }

    #[test]
    fn test_change_type_category_mapping_is_bijective() {
        for category in EventCategory::ALL {
            assert_eq!(category.change_type().category(), category);
        }
    }

    #[test]
    fn test_event_category_follows_change_type() {
        let event = FileChangeEvent::new("src/a.py", ChangeType::Deleted);
        assert_eq!(event.category(), EventCategory::FileDeleted);
        assert_eq!(event.previous_path, None);
    }

    #[test]
    fn test_events_with_same_fields_are_equal() {
        let at = SystemTime::UNIX_EPOCH;
        let a = FileChangeEvent::new("a.py", ChangeType::Modified).with_timestamp(at);
        let b = FileChangeEvent::new("a.py", ChangeType::Modified).with_timestamp(at);
        assert_eq!(a, b);
    }

    #[test]
    fn test_event_json_omits_missing_previous_path() {
        let event = FileChangeEvent::new("a.py", ChangeType::Created)
            .with_timestamp(SystemTime::UNIX_EPOCH);
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["relative_path"], "a.py");
        assert_eq!(json["change_type"], "Created");
        assert!(json.get("previous_path").is_none());

        let moved = FileChangeEvent::new("b.py", ChangeType::Moved).with_previous_path("a.py");
        let json = serde_json::to_string(&moved).expect("serialize");
        let back: FileChangeEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, moved);
    }
}
