//! Raw signal → typed event pipeline
//!
//! One pipeline is built per watch session and owned by its observation
//! thread. It runs every raw notification through the same steps:
//! directory check, relativization against the workspace root, skip rules,
//! tracked extensions, classification, debounce (modifications only), then
//! dispatch.
//!
//! Rename halves are paired here. A `From` half is held for
//! [`RENAME_PAIR_WINDOW`]; a matching `To` half turns the pair into a move,
//! while an unmatched `From` becomes a deletion and an unmatched `To` a
//! creation (a file moved out of or into the workspace).

use crate::debouncer::DebounceTracker;
use crate::dispatcher::Dispatcher;
use crate::events::{ChangeType, FileChangeEvent};
use crate::ignore::{PathFilter, TrackedExtensions};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event as NotifyEvent, EventKind};
use std::collections::{HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::trace;

/// How long a `From` rename half waits for its `To` half
pub const RENAME_PAIR_WINDOW: Duration = Duration::from_millis(100);

/// Rename cookies remembered after pairing, to drop the trailing `Both` event
const PAIRED_TRACKER_CAPACITY: usize = 64;

/// Coarse kind of a raw notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Created,
    Modified,
    Deleted,
    /// Rename with both ends known (`paths = [from, to]`) or a single moved path
    Moved,
    /// Source half of a rename
    RenameFrom,
    /// Destination half of a rename
    RenameTo,
    /// Access, metadata-free or unknown notifications
    Other,
}

/// A notification as produced by the OS facility, before any filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSignal {
    /// Affected paths; for a two-ended rename `[from, to]`
    pub paths: Vec<PathBuf>,
    pub kind: RawKind,
    pub is_directory: bool,
    /// Backend cookie linking the halves of one rename
    pub tracker: Option<usize>,
}

impl RawSignal {
    /// A signal for a single file path
    pub fn file(path: impl Into<PathBuf>, kind: RawKind) -> Self {
        Self {
            paths: vec![path.into()],
            kind,
            is_directory: false,
            tracker: None,
        }
    }

    /// A two-ended rename of a file
    pub fn rename(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![from.into(), to.into()],
            kind: RawKind::Moved,
            is_directory: false,
            tracker: None,
        }
    }

    /// Mark the signal as concerning a directory
    pub fn directory(mut self) -> Self {
        self.is_directory = true;
        self
    }

    /// Attach a rename cookie
    pub fn with_tracker(mut self, tracker: usize) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Classify a notify event
    pub fn from_notify(event: &NotifyEvent) -> Self {
        let kind = match event.kind {
            EventKind::Create(_) => RawKind::Created,
            EventKind::Modify(ModifyKind::Name(RenameMode::Both | RenameMode::Any)) => {
                RawKind::Moved
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => RawKind::RenameFrom,
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawKind::RenameTo,
            EventKind::Modify(ModifyKind::Name(_)) => RawKind::Other,
            EventKind::Modify(_) => RawKind::Modified,
            EventKind::Remove(_) => RawKind::Deleted,
            EventKind::Access(_) | EventKind::Any | EventKind::Other => RawKind::Other,
        };

        let folder_kind = matches!(
            event.kind,
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder)
        );
        let is_directory = folder_kind || event.paths.last().is_some_and(|p| p.is_dir());

        Self {
            paths: event.paths.clone(),
            kind,
            is_directory,
            tracker: event.attrs.tracker(),
        }
    }

    /// The path the change applies to (the destination of a rename)
    pub fn target(&self) -> Option<&Path> {
        self.paths.last().map(PathBuf::as_path)
    }

    /// The source of a two-ended rename
    pub fn source(&self) -> Option<&Path> {
        match self.paths.as_slice() {
            [from, _to] if self.kind == RawKind::Moved => Some(from.as_path()),
            _ => None,
        }
    }
}

/// Make `path` relative to `root` with `/` separators
///
/// Returns `None` for the root itself, for paths outside it, and for paths
/// that escape it through `..`. When a plain prefix strip fails the parent
/// directory is canonicalized, which resolves symlinked roots.
pub fn relativize(root: &Path, path: &Path) -> Option<String> {
    let relative = match path.strip_prefix(root) {
        Ok(relative) => relative.to_path_buf(),
        Err(_) => {
            let parent = path.parent()?.canonicalize().ok()?;
            parent
                .join(path.file_name()?)
                .strip_prefix(root)
                .ok()?
                .to_path_buf()
        }
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            _ => return None,
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Per-session adapter from raw signals to dispatched events
#[derive(Debug)]
pub struct SignalPipeline {
    root: PathBuf,
    filter: PathFilter,
    tracked: TrackedExtensions,
    debounce: DebounceTracker,
    dispatcher: Dispatcher,
    /// `From` halves waiting for their `To` half
    pending_renames: VecDeque<PendingRename>,
    /// Cookies of renames already emitted from their halves
    paired_trackers: VecDeque<usize>,
    /// Directories seen during the session, for backends that report their
    /// removal without a kind
    known_dirs: HashSet<PathBuf>,
}

#[derive(Debug)]
struct PendingRename {
    source: PathBuf,
    tracker: Option<usize>,
    deadline: Instant,
}

impl SignalPipeline {
    pub fn new(
        root: PathBuf,
        filter: PathFilter,
        tracked: TrackedExtensions,
        debounce: DebounceTracker,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            root,
            filter,
            tracked,
            debounce,
            dispatcher,
            pending_renames: VecDeque::new(),
            paired_trackers: VecDeque::new(),
            known_dirs: HashSet::new(),
        }
    }

    /// Relative path of `path` if it lies under the root, passes the skip
    /// rules and carries a tracked extension
    ///
    /// Skip rules see the root-relative path, so a root that itself sits
    /// under a directory such as `build/` is still watched.
    fn eligible(&self, path: &Path) -> Option<String> {
        let Some(relative) = relativize(&self.root, path) else {
            trace!("Outside workspace root: {path:?}");
            return None;
        };
        if self.filter.should_skip(&relative) {
            return None;
        }
        if !self.tracked.matches(path) {
            trace!("Untracked extension: {path:?}");
            return None;
        }
        Some(relative)
    }

    /// Run one raw signal through the pipeline
    ///
    /// Returns the event that was dispatched, if any.
    pub fn process(&mut self, signal: &RawSignal, now: Instant) -> Option<FileChangeEvent> {
        self.flush_expired(now);

        if self.is_directory_signal(signal) {
            trace!("Ignoring directory signal: {:?}", signal.paths);
            return None;
        }

        let event = match signal.kind {
            RawKind::Other => return None,
            RawKind::RenameFrom => {
                self.pending_renames.push_back(PendingRename {
                    source: signal.target()?.to_path_buf(),
                    tracker: signal.tracker,
                    deadline: now + RENAME_PAIR_WINDOW,
                });
                return None;
            }
            RawKind::RenameTo if self.already_paired(signal.tracker) => return None,
            RawKind::RenameTo => {
                let target = signal.target()?;
                match self.take_pending(signal.tracker) {
                    Some(source) => {
                        if let Some(tracker) = signal.tracker {
                            self.remember_paired(tracker);
                        }
                        self.classify_move(&RawSignal::rename(source, target))?
                    }
                    None => FileChangeEvent::new(self.eligible(target)?, ChangeType::Created),
                }
            }
            RawKind::Moved if self.already_paired(signal.tracker) => {
                trace!("Rename {:?} already reported from its halves", signal.paths);
                return None;
            }
            RawKind::Created => {
                FileChangeEvent::new(self.eligible(signal.target()?)?, ChangeType::Created)
            }
            RawKind::Deleted => {
                FileChangeEvent::new(self.eligible(signal.target()?)?, ChangeType::Deleted)
            }
            RawKind::Modified => {
                let relative = self.eligible(signal.target()?)?;
                if !self.debounce.accept(&relative, now) {
                    return None;
                }
                FileChangeEvent::new(relative, ChangeType::Modified)
            }
            RawKind::Moved => {
                // Combined event ahead of its `To` half
                if let Some(tracker) = signal.tracker {
                    if self.take_pending(Some(tracker)).is_some() {
                        self.remember_paired(tracker);
                    }
                }
                self.classify_move(signal)?
            }
        };

        self.dispatcher.dispatch(event.category(), &event);
        Some(event)
    }

    /// Deadline of the oldest unpaired `From` half
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_renames.front().map(|pending| pending.deadline)
    }

    /// Report `From` halves whose window has elapsed as deletions
    pub fn flush_expired(&mut self, now: Instant) -> Vec<FileChangeEvent> {
        let mut flushed = Vec::new();
        while self
            .pending_renames
            .front()
            .is_some_and(|pending| pending.deadline <= now)
        {
            let Some(pending) = self.pending_renames.pop_front() else {
                break;
            };
            if self.known_dirs.remove(&pending.source) {
                continue;
            }
            if let Some(relative) = self.eligible(&pending.source) {
                let event = FileChangeEvent::new(relative, ChangeType::Deleted);
                self.dispatcher.dispatch(event.category(), &event);
                flushed.push(event);
            }
        }
        flushed
    }

    /// Directory signals are dropped; the directories they name are
    /// remembered so a later kind-less removal of the same path is dropped too
    fn is_directory_signal(&mut self, signal: &RawSignal) -> bool {
        let Some(target) = signal.target() else {
            return false;
        };

        if signal.is_directory {
            match signal.kind {
                RawKind::Deleted | RawKind::RenameFrom => {
                    self.known_dirs.remove(target);
                }
                RawKind::RenameTo => {
                    if let Some(source) = self.take_pending(signal.tracker) {
                        self.known_dirs.remove(&source);
                    }
                    if let Some(tracker) = signal.tracker {
                        self.remember_paired(tracker);
                    }
                    self.known_dirs.insert(target.to_path_buf());
                }
                RawKind::Moved => {
                    if let Some(source) = signal.source() {
                        self.known_dirs.remove(source);
                    }
                    self.known_dirs.insert(target.to_path_buf());
                }
                _ => {
                    self.known_dirs.insert(target.to_path_buf());
                }
            }
            return true;
        }

        signal.kind == RawKind::Deleted && self.known_dirs.remove(target)
    }

    fn take_pending(&mut self, tracker: Option<usize>) -> Option<PathBuf> {
        let index = self
            .pending_renames
            .iter()
            .position(|pending| pending.tracker == tracker)?;
        self.pending_renames
            .remove(index)
            .map(|pending| pending.source)
    }

    fn remember_paired(&mut self, tracker: usize) {
        if self.paired_trackers.len() == PAIRED_TRACKER_CAPACITY {
            self.paired_trackers.pop_front();
        }
        self.paired_trackers.push_back(tracker);
    }

    fn already_paired(&mut self, tracker: Option<usize>) -> bool {
        let Some(tracker) = tracker else {
            return false;
        };
        match self.paired_trackers.iter().position(|t| *t == tracker) {
            Some(index) => {
                self.paired_trackers.remove(index);
                true
            }
            None => false,
        }
    }

    /// A rename whose source is ineligible surfaces as a creation of the
    /// destination; one whose destination is ineligible as a deletion of the
    /// source.
    fn classify_move(&self, signal: &RawSignal) -> Option<FileChangeEvent> {
        let to = self.eligible(signal.target()?);
        let from = signal.source().and_then(|source| self.eligible(source));

        match (from, to) {
            (Some(from), Some(to)) => {
                Some(FileChangeEvent::new(to, ChangeType::Moved).with_previous_path(from))
            }
            (None, Some(to)) if signal.source().is_some() => {
                Some(FileChangeEvent::new(to, ChangeType::Created))
            }
            (None, Some(to)) => Some(FileChangeEvent::new(to, ChangeType::Moved)),
            (Some(from), None) => Some(FileChangeEvent::new(from, ChangeType::Deleted)),
            (None, None) => None,
        }
    }
}
