//! Error types for the directory watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur in the directory watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The watcher could not come up.
    #[error("watch setup failed: {0}")]
    Setup(#[from] SetupError),

    /// The watcher came up and then stopped observing.
    #[error("watch runtime failure: {0}")]
    Runtime(#[from] RuntimeError),

    /// Watcher already running.
    #[error("watcher already running for: {0}")]
    AlreadyRunning(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] toml::de::Error),
}

impl WatcherError {
    /// Whether this error means the watcher never started.
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup(_))
    }

    /// Whether this error means a running watcher halted.
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }
}

/// Failures while starting a watch. Nothing is left running when one of
/// these is returned.
#[derive(Error, Debug)]
pub enum SetupError {
    /// Root directory does not exist.
    #[error("directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    /// Root exists but is not a directory.
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Root could not be listed.
    #[error("directory not readable: {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS subscription could not be installed.
    #[error("could not subscribe to changes under {}: {source}", path.display())]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    /// No directory holding the marker was found above the start.
    #[error("no directory containing `{marker}` found above {}", start.display())]
    MarkerNotFound { marker: String, start: PathBuf },

    /// The wait thread could not be spawned.
    #[error("could not spawn wait thread: {0}")]
    SpawnThread(#[source] std::io::Error),
}

/// Failures of a running watch. Each one halts the watcher; restarting
/// means constructing a new one.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The signal channel closed while no stop was requested.
    #[error("wait on change notifications ended unexpectedly")]
    WaitAborted,

    /// The subscription can no longer observe the root.
    #[error("could not re-arm watch on {}: {reason}", path.display())]
    RearmFailed { path: PathBuf, reason: String },

    /// The wait thread panicked.
    #[error("wait thread panicked")]
    WaitThreadPanicked,
}
