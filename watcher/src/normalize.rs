//! Conversion of raw backend records into [`ChangeEvent`]s.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use tracing::trace;

use crate::config::PathMode;
use crate::event::{ChangeEvent, EventKind};
use crate::filter::PathFilter;

/// Turns `notify` records into canonical events for one root.
///
/// The normalizer is stateful only to recognize rename records that a
/// backend reports twice (inotify sends `From`, `To` and then `Both` for the
/// same move). Everything else is a pure mapping.
#[derive(Debug)]
pub struct Normalizer {
    root: PathBuf,
    root_parent: Option<PathBuf>,
    mode: PathMode,
    filter: PathFilter,
    halves: RenameHalves,
}

/// The last rename halves emitted, in case a paired record repeats them.
#[derive(Debug, Default)]
struct RenameHalves {
    from: Option<PathBuf>,
    to: Option<PathBuf>,
}

impl RenameHalves {
    fn matches(&self, from: &Path, to: &Path) -> bool {
        self.from.as_deref() == Some(from) && self.to.as_deref() == Some(to)
    }

    fn clear(&mut self) {
        self.from = None;
        self.to = None;
    }
}

impl Normalizer {
    /// Create a normalizer for an already canonicalized root.
    pub fn new(root: impl Into<PathBuf>, mode: PathMode, filter: PathFilter) -> Self {
        let root = root.into();
        let root_parent = root.parent().map(Path::to_path_buf);
        Self {
            root,
            root_parent,
            mode,
            filter,
            halves: RenameHalves::default(),
        }
    }

    /// Root this normalizer renders paths against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convert one raw record into zero or more events, in the order the
    /// record lists its paths.
    pub fn normalize(&mut self, event: &notify::Event) -> Vec<ChangeEvent> {
        use notify::EventKind as Raw;

        match &event.kind {
            // Reads are not mutations.
            Raw::Access(_) => Vec::new(),
            Raw::Modify(ModifyKind::Name(RenameMode::From)) => {
                self.halves.from = event.paths.first().cloned();
                self.halves.to = None;
                self.emit_all(&event.paths, EventKind::RenamedFrom)
            }
            Raw::Modify(ModifyKind::Name(RenameMode::To)) => {
                self.halves.to = event.paths.first().cloned();
                self.emit_all(&event.paths, EventKind::RenamedTo)
            }
            Raw::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let events = match event.paths.as_slice() {
                    [from, to] if self.halves.matches(from, to) => {
                        trace!("dropping paired rename already seen as halves");
                        Vec::new()
                    }
                    [from, to] => self
                        .emit(from, EventKind::RenamedFrom)
                        .into_iter()
                        .chain(self.emit(to, EventKind::RenamedTo))
                        .collect(),
                    paths => self.emit_all(paths, EventKind::Unknown),
                };
                self.halves.clear();
                events
            }
            other => {
                self.halves.clear();
                let kind = classify(other);
                if event.paths.is_empty() {
                    // Nothing to attribute the record to (e.g. a rescan
                    // request); report it against the root.
                    return vec![ChangeEvent::new(
                        self.render(&self.root),
                        EventKind::Unknown,
                    )];
                }
                self.emit_all(&event.paths, kind)
            }
        }
    }

    /// Render a native path per the configured [`PathMode`].
    pub fn render(&self, path: &Path) -> String {
        let base = match self.mode {
            PathMode::Absolute => None,
            PathMode::RootNamed => self.root_parent.as_deref(),
            PathMode::RootRelative => Some(self.root.as_path()),
        };
        let rendered = base
            .and_then(|base| path.strip_prefix(base).ok())
            .map_or_else(|| to_canonical(path), to_canonical);
        if rendered.is_empty() {
            ".".to_string()
        } else {
            rendered
        }
    }

    fn emit_all(&self, paths: &[PathBuf], kind: EventKind) -> Vec<ChangeEvent> {
        paths.iter().filter_map(|p| self.emit(p, kind)).collect()
    }

    fn emit(&self, path: &Path, kind: EventKind) -> Option<ChangeEvent> {
        if !self.filter.is_pass_through() {
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if self.filter.excludes(&to_canonical(relative)) {
                trace!("excluded {}", path.display());
                return None;
            }
        }
        Some(ChangeEvent::new(self.render(path), kind))
    }
}

/// Map a non-rename backend kind onto the closed [`EventKind`] set.
fn classify(kind: &notify::EventKind) -> EventKind {
    use notify::EventKind as Raw;

    match kind {
        Raw::Create(_) => EventKind::Created,
        Raw::Remove(_) => EventKind::Deleted,
        // Renames without a direction (FSEvents, kqueue) only say the entry
        // changed.
        Raw::Modify(_) => EventKind::Modified,
        Raw::Access(_) | Raw::Any | Raw::Other => EventKind::Unknown,
    }
}

/// Convert a native path to UTF-8 with `/` as the only separator.
///
/// Invalid sequences in the native encoding are replaced rather than
/// rejected, and `\` is rewritten on every host.
pub fn to_canonical(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
