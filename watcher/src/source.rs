//! OS subscription and the dedicated wait thread.
//!
//! The `notify` backend invokes its callback from a thread it owns. That
//! callback only forwards raw records into an unbounded channel. A thread we
//! own waits on the channel, normalizes each record, pushes the result into
//! the [`EventQueue`] and then re-arms, i.e. confirms the subscription can
//! still observe the root. Because that thread is the only producer and
//! [`ChangeSource::stop`] joins it, nothing reaches the queue after `stop`
//! returns, whatever the backend thread is still doing.
//!
//! Between two reads of the backend the OS may coalesce records, and under
//! pressure some backends drop them (inotify queue overflow surfaces as a
//! rescan request, reported as `Unknown` on the root). That is a property of
//! directory-change APIs, not something the wait loop can recover.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use notify::event::{ModifyKind, RenameMode};
use notify::{RecommendedWatcher, Watcher};
use same_file::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{WatchConfig, WatchScope};
use crate::error::{Result, RuntimeError, SetupError};
use crate::filter::PathFilter;
use crate::normalize::Normalizer;
use crate::queue::EventQueue;

const WAIT_THREAD_NAME: &str = "io-events-wait";

/// What the wait thread receives.
#[derive(Debug)]
enum Signal {
    /// A raw record, or a recoverable error, from the backend.
    Record(notify::Result<notify::Event>),

    /// Leave the wait loop.
    Shutdown,
}

/// Shared view of a change source's health.
#[derive(Debug, Default)]
pub struct WatchStatus {
    // Held by the wait loop while it normalizes and queues a record.
    stopping: Mutex<bool>,
    halted: AtomicBool,
    fault: Mutex<Option<RuntimeError>>,
    records: AtomicU64,
    backend_errors: AtomicU64,
}

impl WatchStatus {
    /// Whether the wait loop stopped because of a runtime fault.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Whether a stop was requested.
    pub fn is_stopping(&self) -> bool {
        *self.stop_gate()
    }

    /// Take the fault that halted the wait loop. Returns it only once.
    pub fn take_fault(&self) -> Option<RuntimeError> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Raw records received from the backend.
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Recoverable errors reported by the backend.
    pub fn backend_errors(&self) -> u64 {
        self.backend_errors.load(Ordering::Relaxed)
    }

    pub(crate) fn halt(&self, fault: RuntimeError) {
        *self.fault.lock().unwrap_or_else(PoisonError::into_inner) = Some(fault);
        self.halted.store(true, Ordering::Release);
    }

    /// Mark teardown as begun. Waits for a record being normalized to be
    /// queued; no record is normalized afterwards.
    pub(crate) fn request_stop(&self) {
        *self.stop_gate() = true;
    }

    fn stop_gate(&self) -> MutexGuard<'_, bool> {
        self.stopping.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The live OS subscription. Dropping it releases the subscription.
struct WatchHandle {
    _watcher: RecommendedWatcher,
}

impl WatchHandle {
    fn subscribe(
        root: &Path,
        scope: WatchScope,
        signal_tx: mpsc::UnboundedSender<Signal>,
    ) -> std::result::Result<Self, SetupError> {
        let subscribe_error = |source| SetupError::Subscribe {
            path: root.to_path_buf(),
            source,
        };

        let mut watcher = notify::recommended_watcher(
            move |res: notify::Result<notify::Event>| {
                // Fails only once the wait loop is gone, and then nobody
                // wants the record.
                let _ = signal_tx.send(Signal::Record(res));
            },
        )
        .map_err(subscribe_error)?;
        watcher
            .watch(root, scope.recursive_mode())
            .map_err(subscribe_error)?;

        Ok(Self { _watcher: watcher })
    }
}

/// Watches one root and feeds normalized events into a queue.
pub struct ChangeSource {
    root: PathBuf,
    status: Arc<WatchStatus>,
    // The backend callback owns the only strong sender, so the channel
    // closes if the backend goes away.
    signal_tx: mpsc::WeakUnboundedSender<Signal>,
    handle: Option<WatchHandle>,
    wait_thread: Option<JoinHandle<()>>,
}

impl ChangeSource {
    /// Validate the root, subscribe to its changes and start the wait thread.
    ///
    /// On error nothing is left running: no subscription and no thread.
    pub fn start(config: &WatchConfig, queue: Arc<EventQueue>) -> Result<Self> {
        config.validate()?;
        let root = validate_root(&config.root)?;

        let status = Arc::new(WatchStatus::default());
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let wait_loop = WaitLoop::new(
            root.clone(),
            signal_rx,
            Normalizer::new(
                root.clone(),
                config.path_mode,
                PathFilter::new(&config.exclude_patterns),
            ),
            queue,
            Arc::clone(&status),
        )?;

        let weak_tx = signal_tx.downgrade();
        let handle = WatchHandle::subscribe(&root, config.scope, signal_tx)?;
        let wait_thread = thread::Builder::new()
            .name(WAIT_THREAD_NAME.to_string())
            .spawn(move || wait_loop.run())
            .map_err(SetupError::SpawnThread)?;

        info!("Started watching: {}", root.display());
        Ok(Self {
            root,
            status,
            signal_tx: weak_tx,
            handle: Some(handle),
            wait_thread: Some(wait_thread),
        })
    }

    /// Canonical root being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared health of this source.
    pub fn status(&self) -> Arc<WatchStatus> {
        Arc::clone(&self.status)
    }

    /// Whether the wait loop is still observing changes.
    pub fn is_running(&self) -> bool {
        self.wait_thread.is_some() && !self.status.is_halted()
    }

    /// Stop watching. Safe to call more than once.
    ///
    /// Signals the wait thread, releases the OS subscription and waits for
    /// the thread to exit. No event is pushed after this returns.
    pub fn stop(&mut self) -> Result<()> {
        let Some(wait_thread) = self.wait_thread.take() else {
            return Ok(());
        };

        self.status.request_stop();
        if let Some(signal_tx) = self.signal_tx.upgrade() {
            // The receiver is only gone if the loop already exited.
            let _ = signal_tx.send(Signal::Shutdown);
        }
        drop(self.handle.take());

        let joined = wait_thread.join();
        info!("Stopped watching: {}", self.root.display());
        joined.map_err(|_| RuntimeError::WaitThreadPanicked.into())
    }
}

impl Drop for ChangeSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error while stopping watch on {}: {e}", self.root.display());
        }
    }
}

impl std::fmt::Debug for ChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSource")
            .field("root", &self.root)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// State owned by the wait thread.
struct WaitLoop {
    root: PathBuf,
    // The directory the subscription is attached to. Kept open so its
    // identity cannot be reused while we watch.
    identity: Handle,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    normalizer: Normalizer,
    queue: Arc<EventQueue>,
    status: Arc<WatchStatus>,
}

impl WaitLoop {
    fn new(
        root: PathBuf,
        signal_rx: mpsc::UnboundedReceiver<Signal>,
        normalizer: Normalizer,
        queue: Arc<EventQueue>,
        status: Arc<WatchStatus>,
    ) -> std::result::Result<Self, SetupError> {
        let identity = Handle::from_path(&root).map_err(|source| SetupError::Unreadable {
            path: root.clone(),
            source,
        })?;

        Ok(Self {
            root,
            identity,
            signal_rx,
            normalizer,
            queue,
            status,
        })
    }

    fn run(mut self) {
        debug!("Wait loop started for {}", self.root.display());
        if let Err(fault) = self.wait() {
            error!("Watch on {} halted: {fault}", self.root.display());
            self.status.halt(fault);
        }
        debug!("Wait loop exited for {}", self.root.display());
    }

    fn wait(&mut self) -> std::result::Result<(), RuntimeError> {
        loop {
            // Indefinite wait; this thread suspends nowhere else.
            match self.signal_rx.blocking_recv() {
                Some(Signal::Record(Ok(event))) => {
                    if !self.deliver(&event) {
                        return Ok(());
                    }
                    if self.root_left(&event) {
                        return Err(self.rearm_failed("root was removed or renamed"));
                    }
                }
                Some(Signal::Record(Err(err))) => {
                    if self.status.is_stopping() {
                        return Ok(());
                    }
                    self.status.backend_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Watch error under {}: {err}", self.root.display());
                }
                Some(Signal::Shutdown) => return Ok(()),
                None if self.status.is_stopping() => return Ok(()),
                None => return Err(RuntimeError::WaitAborted),
            }

            self.rearm()?;
        }
    }

    /// Normalize and queue one record. Returns `false` without touching the
    /// normalizer once teardown has begun.
    fn deliver(&mut self, event: &notify::Event) -> bool {
        let stopping = self.status.stop_gate();
        if *stopping {
            return false;
        }

        self.status.records.fetch_add(1, Ordering::Relaxed);
        let events = self.normalizer.normalize(event);
        debug!("{:?} -> {} event(s)", event.kind, events.len());
        self.queue.push_batch(events);
        true
    }

    /// Whether the record says the root itself went away.
    fn root_left(&self, event: &notify::Event) -> bool {
        use notify::EventKind as Raw;

        let leaving = matches!(
            event.kind,
            Raw::Remove(_) | Raw::Modify(ModifyKind::Name(RenameMode::From | RenameMode::Both))
        );
        leaving && event.paths.first().is_some_and(|path| *path == self.root)
    }

    /// Confirm the subscription can still see the root. A deleted, moved or
    /// replaced root leaves the OS watch on a directory nobody is looking
    /// at, without any further record.
    fn rearm(&self) -> std::result::Result<(), RuntimeError> {
        match Handle::from_path(&self.root) {
            Ok(current) if current == self.identity => Ok(()),
            Ok(_) => Err(self.rearm_failed("root was replaced by another entry")),
            Err(err) => Err(self.rearm_failed(err.to_string())),
        }
    }

    fn rearm_failed(&self, reason: impl Into<String>) -> RuntimeError {
        RuntimeError::RearmFailed {
            path: self.root.clone(),
            reason: reason.into(),
        }
    }
}

/// Check that `root` is an existing, readable directory and canonicalize it.
fn validate_root(root: &Path) -> std::result::Result<PathBuf, SetupError> {
    let unreadable = |source| SetupError::Unreadable {
        path: root.to_path_buf(),
        source,
    };

    let meta = fs::metadata(root).map_err(|err| match err.kind() {
        ErrorKind::NotFound => SetupError::RootNotFound(root.to_path_buf()),
        _ => unreadable(err),
    })?;
    if !meta.is_dir() {
        return Err(SetupError::NotADirectory(root.to_path_buf()));
    }
    fs::read_dir(root).map_err(unreadable)?;

    dunce::canonicalize(root).map_err(unreadable)
}
