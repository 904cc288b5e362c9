//! Where the root to watch comes from.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SetupError};

/// Supplies the root directory to watch.
pub trait RootProvider {
    /// Resolve the root path.
    fn root(&self) -> Result<PathBuf>;
}

/// A root known up front.
#[derive(Debug, Clone)]
pub struct FixedRoot(PathBuf);

impl FixedRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

impl RootProvider for FixedRoot {
    fn root(&self) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

/// Finds the root by walking up from a start directory to the first
/// directory that contains a marker subdirectory.
///
/// A binary started from `Game/bin/win64/` with marker `game` resolves to
/// `Game/` as long as `Game/game/` exists.
#[derive(Debug, Clone)]
pub struct MarkerRoot {
    marker: String,
    start: Option<PathBuf>,
    max_levels: usize,
}

impl MarkerRoot {
    /// Default number of directories examined, the start included.
    pub const DEFAULT_MAX_LEVELS: usize = 5;

    /// Search from the current working directory for `marker`.
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
            start: None,
            max_levels: Self::DEFAULT_MAX_LEVELS,
        }
    }

    /// Search from `start` instead of the current working directory.
    pub fn starting_at(mut self, start: impl Into<PathBuf>) -> Self {
        self.start = Some(start.into());
        self
    }

    /// Limit how many directories are examined.
    pub fn with_max_levels(mut self, levels: usize) -> Self {
        self.max_levels = levels;
        self
    }

    fn has_marker(&self, dir: &Path) -> bool {
        dir.join(&self.marker).is_dir()
    }
}

impl RootProvider for MarkerRoot {
    fn root(&self) -> Result<PathBuf> {
        let start = match &self.start {
            Some(start) => start.clone(),
            None => std::env::current_dir()?,
        };

        let mut current = start.clone();
        for _ in 0..self.max_levels {
            if self.has_marker(&current) {
                debug!("Found `{}` under {}", self.marker, current.display());
                return Ok(current);
            }
            if !current.pop() {
                break;
            }
        }

        Err(SetupError::MarkerNotFound {
            marker: self.marker.clone(),
            start,
        }
        .into())
    }
}
