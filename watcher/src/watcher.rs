//! Directory watcher implementation.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WatchConfig;
use crate::dispatch::{Dispatcher, EventConsumer};
use crate::error::Result;
use crate::event::ChangeEvent;
use crate::queue::{EventQueue, QueueStats};
use crate::source::{ChangeSource, WatchStatus};

/// A running watch on one root, owning its queue and OS subscription.
///
/// Instances are independent: any number can run side by side, each with
/// its own thread and queue. Dropping the watcher stops it.
#[derive(Debug)]
pub struct DirectoryWatcher {
    config: WatchConfig,
    queue: Arc<EventQueue>,
    source: ChangeSource,
}

impl DirectoryWatcher {
    /// Start watching `config.root`.
    ///
    /// Fails with [`WatcherError::Setup`](crate::WatcherError::Setup) if the
    /// root is missing or unreadable or the OS subscription cannot be made.
    pub fn start(config: WatchConfig) -> Result<Self> {
        let queue = Arc::new(EventQueue::new());
        let source = ChangeSource::start(&config, Arc::clone(&queue))?;

        Ok(Self {
            config,
            queue,
            source,
        })
    }

    /// Configuration this watcher was started with.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Canonical root being watched.
    pub fn root(&self) -> &Path {
        self.source.root()
    }

    /// Check if the watcher is still observing changes.
    pub fn is_running(&self) -> bool {
        self.source.is_running()
    }

    /// Shared event queue.
    pub fn queue(&self) -> Arc<EventQueue> {
        Arc::clone(&self.queue)
    }

    /// Shared health of the change source.
    pub fn status(&self) -> Arc<WatchStatus> {
        self.source.status()
    }

    /// Take every queued event without going through a dispatcher.
    pub fn drain(&self) -> Vec<ChangeEvent> {
        self.queue.drain_all()
    }

    /// Build a dispatcher that drains this watcher into `consumer` and
    /// reports its faults.
    pub fn dispatcher<C: EventConsumer>(&self, consumer: C) -> Dispatcher<C> {
        Dispatcher::new(self.queue(), consumer).with_status(self.status())
    }

    /// Stop watching. Safe to call more than once.
    ///
    /// Events still queued are discarded.
    pub fn stop(&mut self) -> Result<()> {
        let stopped = self.source.stop();
        let discarded = self.queue.clear();
        if discarded > 0 {
            debug!(
                "Discarded {discarded} undelivered event(s) for {}",
                self.root().display()
            );
        }
        stopped
    }

    /// Get statistics about the watcher.
    pub fn stats(&self) -> WatcherStats {
        let status = self.source.status();
        WatcherStats {
            running: self.is_running(),
            records: status.records(),
            backend_errors: status.backend_errors(),
            queue: self.queue.stats(),
        }
    }
}

/// Statistics about the directory watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherStats {
    /// Whether the watcher is observing changes.
    pub running: bool,

    /// Raw records received from the backend.
    pub records: u64,

    /// Recoverable backend errors.
    pub backend_errors: u64,

    /// Queue counters.
    pub queue: QueueStats,
}
