//! Load and unload entry points for a host that embeds the watcher.
//!
//! A host calls [`HostModule::on_load`] when it brings the module up and
//! [`HostModule::on_unload`] when it tears it down. Ticks either run on a
//! tokio runtime ([`TickDriver::Runtime`]) or are driven by the host's own
//! timer calling [`HostModule::tick`] ([`TickDriver::Host`]), for hosts whose
//! consumer may only be called from one particular thread.

use std::path::PathBuf;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::dispatch::{Dispatcher, EventConsumer, TickReport};
use crate::error::{Result, WatcherError};
use crate::watcher::DirectoryWatcher;

/// Who schedules drain ticks.
#[derive(Debug, Clone)]
pub enum TickDriver {
    /// A task on this runtime ticks at the configured interval.
    Runtime(Handle),

    /// The host calls [`HostModule::tick`] itself.
    Host,
}

impl TickDriver {
    /// Tick on the runtime the caller is running in.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::Runtime)
            .map_err(|e| WatcherError::Config(format!("no tokio runtime to tick on: {e}")))
    }
}

/// Watcher plus drain schedule, started on load and torn down on unload.
pub struct HostModule<C> {
    settings: WatchConfig,
    driver: TickDriver,
    session: Option<Session<C>>,
}

struct Session<C> {
    watcher: DirectoryWatcher,
    ticks: Ticks<C>,
}

enum Ticks<C> {
    Task {
        cancel: CancellationToken,
        _task: JoinHandle<C>,
    },
    Host(Dispatcher<C>),
}

impl<C: EventConsumer + 'static> HostModule<C> {
    /// Create an unloaded module with default watch settings.
    pub fn new(driver: TickDriver) -> Self {
        Self {
            settings: WatchConfig::new(PathBuf::new()),
            driver,
            session: None,
        }
    }

    /// Use these settings for every load. Their `root` is ignored; the root
    /// comes from [`on_load`](Self::on_load).
    pub fn with_settings(mut self, settings: WatchConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Start watching `root` and schedule the drain into `consumer`.
    ///
    /// Loading an already loaded module does nothing and drops `consumer`.
    /// On error the module stays unloaded.
    pub fn on_load(&mut self, root: impl Into<PathBuf>, consumer: C) -> Result<()> {
        let root = root.into();
        if let Some(session) = &self.session {
            debug!(
                "Ignoring load of {}: already watching {}",
                root.display(),
                session.watcher.root().display()
            );
            return Ok(());
        }

        let config = WatchConfig {
            root,
            ..self.settings.clone()
        };
        let interval = config.tick_interval();
        let watcher = DirectoryWatcher::start(config)?;
        let dispatcher = watcher.dispatcher(consumer);

        let ticks = match &self.driver {
            TickDriver::Runtime(handle) => {
                let cancel = CancellationToken::new();
                let task = handle.spawn(dispatcher.run(interval, cancel.clone()));
                Ticks::Task {
                    cancel,
                    _task: task,
                }
            }
            TickDriver::Host => Ticks::Host(dispatcher),
        };

        info!("Module loaded for {}", watcher.root().display());
        self.session = Some(Session { watcher, ticks });
        Ok(())
    }

    /// Run one drain when the host drives ticks.
    ///
    /// Returns `None` if the module is not loaded or ticks run on a runtime.
    pub fn tick(&mut self) -> Option<TickReport> {
        match &mut self.session.as_mut()?.ticks {
            Ticks::Host(dispatcher) => Some(dispatcher.tick()),
            Ticks::Task { .. } => None,
        }
    }
}

impl<C> HostModule<C> {
    /// Whether a watcher is currently up.
    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// The running watcher, if loaded.
    pub fn watcher(&self) -> Option<&DirectoryWatcher> {
        self.session.as_ref().map(|s| &s.watcher)
    }

    /// Stop the drain schedule and the watcher. Unloading an unloaded
    /// module does nothing.
    ///
    /// A tick already in progress on the runtime finishes; none starts after
    /// this returns. Queued events are discarded.
    pub fn on_unload(&mut self) -> Result<()> {
        let Some(Session { mut watcher, ticks }) = self.session.take() else {
            return Ok(());
        };

        if let Ticks::Task { cancel, .. } = &ticks {
            cancel.cancel();
        }
        let stopped = watcher.stop();
        info!("Module unloaded for {}", watcher.root().display());
        stopped
    }
}

impl<C> Drop for HostModule<C> {
    fn drop(&mut self) {
        if let Err(e) = self.on_unload() {
            warn!("Error while unloading: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathMode;
    use crate::event::EventKind;
    use std::fs::File;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    type Received = (String, EventKind);

    fn forwarder(
        tx: mpsc::Sender<Received>,
    ) -> impl FnMut(&str, EventKind) -> anyhow::Result<()> + Send + 'static {
        move |path: &str, kind: EventKind| -> anyhow::Result<()> {
            tx.send((path.to_string(), kind))?;
            Ok(())
        }
    }

    fn settings() -> WatchConfig {
        WatchConfig::new(PathBuf::new())
            .with_path_mode(PathMode::RootRelative)
            .with_tick_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_host_driven_ticks() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let mut module = HostModule::new(TickDriver::Host).with_settings(settings());
        module.on_load(temp_dir.path(), forwarder(tx)).unwrap();

        File::create(temp_dir.path().join("a.txt")).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut created = false;
        while !created && Instant::now() < deadline {
            module.tick().unwrap();
            created = rx
                .try_iter()
                .any(|(path, kind)| path == "a.txt" && kind == EventKind::Created);
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(created);

        module.on_unload().unwrap();
        assert!(module.tick().is_none());
    }

    #[test]
    fn test_load_and_unload_are_idempotent() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut module = HostModule::new(TickDriver::Host).with_settings(settings());

        module.on_load(first.path(), forwarder(tx.clone())).unwrap();
        module.on_load(second.path(), forwarder(tx)).unwrap();
        assert_eq!(
            module.watcher().unwrap().root(),
            dunce::canonicalize(first.path()).unwrap()
        );

        module.on_unload().unwrap();
        module.on_unload().unwrap();
        assert!(!module.is_loaded());
    }

    #[test]
    fn test_failed_load_can_be_retried() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("watched");
        let (tx, _rx) = mpsc::channel();
        let mut module = HostModule::new(TickDriver::Host);

        let err = module.on_load(&root, forwarder(tx.clone())).unwrap_err();
        assert!(err.is_setup());
        assert!(!module.is_loaded());

        std::fs::create_dir(&root).unwrap();
        module.on_load(&root, forwarder(tx)).unwrap();
        assert!(module.is_loaded());
    }

    #[test]
    fn test_drop_unloads() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel();
        let mut module = HostModule::new(TickDriver::Host).with_settings(settings());
        module.on_load(temp_dir.path(), forwarder(tx)).unwrap();
        let status = module.watcher().unwrap().status();
        let queue = module.watcher().unwrap().queue();
        queue.push(crate::event::ChangeEvent::new("pending", EventKind::Created));

        drop(module);

        assert!(status.is_stopping());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_runtime_driver_requires_runtime() {
        assert!(TickDriver::current().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_runtime_driven_ticks() {
        let temp_dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let mut module = HostModule::new(TickDriver::current().unwrap()).with_settings(settings());
        module.on_load(temp_dir.path(), forwarder(tx)).unwrap();
        assert!(module.tick().is_none());

        File::create(temp_dir.path().join("b.txt")).unwrap();

        let received = tokio::task::spawn_blocking(move || {
            let deadline = Instant::now() + Duration::from_secs(5);
            while let Some(left) = deadline.checked_duration_since(Instant::now()) {
                match rx.recv_timeout(left) {
                    Ok((path, EventKind::Created)) if path == "b.txt" => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
            false
        })
        .await
        .unwrap();
        assert!(received);

        module.on_unload().unwrap();
    }
}
