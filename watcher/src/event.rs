//! Change events as seen by consumers.

use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};

/// A normalized file system change.
///
/// The path always uses `/` as separator. Whether it is absolute or relative
/// depends on the [`PathMode`](crate::PathMode) the watcher was configured
/// with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    path: String,
    kind: EventKind,
}

impl ChangeEvent {
    /// Create a new change event.
    pub fn new(path: impl Into<String>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Canonical path of the affected entry.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// What happened to the entry.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Split the event into its path and kind.
    pub fn into_parts(self) -> (String, EventKind) {
        (self.path, self.kind)
    }
}

/// Kind of change.
///
/// This is a closed set. The strum attributes below are the only place the
/// boundary labels are spelled out; `Display`, `FromStr` and serde all go
/// through them. `CHANGED` parses as `MODIFIED`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr, IntoStaticStr,
)]
pub enum EventKind {
    /// Entry was created.
    #[strum(serialize = "CREATED")]
    Created,

    /// Entry content or metadata changed.
    #[strum(to_string = "MODIFIED", serialize = "CHANGED")]
    Modified,

    /// Entry was deleted.
    #[strum(serialize = "DELETED")]
    Deleted,

    /// Old name half of a rename.
    #[strum(serialize = "RENAMED_OLD")]
    RenamedFrom,

    /// New name half of a rename.
    #[strum(serialize = "RENAMED_NEW")]
    RenamedTo,

    /// The backend reported something it could not classify.
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 6] = [
        Self::Created,
        Self::Modified,
        Self::Deleted,
        Self::RenamedFrom,
        Self::RenamedTo,
        Self::Unknown,
    ];

    /// Boundary label of this kind.
    pub fn label(self) -> &'static str {
        self.into()
    }

    /// Whether this is one half of a rename pair.
    pub fn is_rename(self) -> bool {
        matches!(self, Self::RenamedFrom | Self::RenamedTo)
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::from_str(&label)
            .map_err(|_| D::Error::custom(format!("unknown event kind: {label}")))
    }
}
