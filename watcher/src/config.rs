//! Configuration types for directory watching.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Default interval between drain ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Configuration for a watched root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directory to watch.
    pub root: PathBuf,

    /// How much of the tree below the root is observed.
    #[serde(default)]
    pub scope: WatchScope,

    /// How event paths are rendered.
    #[serde(default)]
    pub path_mode: PathMode,

    /// Milliseconds between drain ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Patterns to exclude, matched against the root-relative path.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}

impl WatchConfig {
    /// Create a new watch config with defaults for everything but the root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scope: WatchScope::default(),
            path_mode: PathMode::default(),
            tick_interval_ms: default_tick_interval_ms(),
            exclude_patterns: Vec::new(),
        }
    }

    /// Set the watch scope.
    pub fn with_scope(mut self, scope: WatchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Set the path mode.
    pub fn with_path_mode(mut self, mode: PathMode) -> Self {
        self.path_mode = mode;
        self
    }

    /// Set the drain tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Add an exclude pattern.
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_patterns.push(pattern.into());
        self
    }

    /// Interval between drain ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Parse a config from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(WatcherError::Config(
                "tick interval must be greater than zero".to_string(),
            ));
        }
        if self.root.as_os_str().is_empty() {
            return Err(WatcherError::Config("root path is empty".to_string()));
        }
        if let Some(idx) = self.exclude_patterns.iter().position(String::is_empty) {
            return Err(WatcherError::Config(format!(
                "exclude pattern #{idx} is empty"
            )));
        }
        Ok(())
    }
}

/// How much of the tree below the root is observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchScope {
    /// Every entry in the root and all of its subdirectories.
    #[default]
    Subtree,

    /// Only the root's immediate entries.
    TopLevel,
}

impl WatchScope {
    pub(crate) fn recursive_mode(self) -> notify::RecursiveMode {
        match self {
            Self::Subtree => notify::RecursiveMode::Recursive,
            Self::TopLevel => notify::RecursiveMode::NonRecursive,
        }
    }
}

/// How event paths are rendered.
///
/// For a root of `/tmp/watched` and a change to `/tmp/watched/a.txt`:
///
/// | mode | path |
/// |---|---|
/// | `Absolute` | `/tmp/watched/a.txt` |
/// | `RootNamed` | `watched/a.txt` |
/// | `RootRelative` | `a.txt` |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMode {
    /// Full canonical path.
    #[default]
    Absolute,

    /// Relative to the root's parent; the root's name is the first segment.
    RootNamed,

    /// Relative to the root.
    RootRelative,
}
