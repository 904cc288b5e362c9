//! Periodic drain of the event queue into a consumer.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::RuntimeError;
use crate::event::{ChangeEvent, EventKind};
use crate::queue::EventQueue;
use crate::source::WatchStatus;

/// Receives events on the consumer's side of the queue.
///
/// Implemented for any `FnMut(&str, EventKind) -> anyhow::Result<()>`.
pub trait EventConsumer: Send {
    /// Handle one event. An error is logged and does not stop delivery of
    /// the remaining events.
    fn on_event(&mut self, path: &str, kind: EventKind) -> anyhow::Result<()>;

    /// Called once when the watcher halted and will produce no more events.
    fn on_fault(&mut self, fault: &RuntimeError) {
        error!("Watcher halted: {fault}");
    }
}

impl<F> EventConsumer for F
where
    F: FnMut(&str, EventKind) -> anyhow::Result<()> + Send,
{
    fn on_event(&mut self, path: &str, kind: EventKind) -> anyhow::Result<()> {
        self(path, kind)
    }
}

/// Outcome of one tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Events the consumer accepted.
    pub delivered: usize,

    /// Events the consumer failed on.
    pub failed: usize,

    /// Set when the watcher halted since the previous tick.
    pub fault: Option<RuntimeError>,
}

impl TickReport {
    /// Number of events drained in this tick.
    pub fn drained(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Drains a queue and hands each event to a consumer, in order.
pub struct Dispatcher<C> {
    queue: Arc<EventQueue>,
    status: Option<Arc<WatchStatus>>,
    consumer: C,
    ticks: u64,
}

impl<C: EventConsumer> Dispatcher<C> {
    /// Create a dispatcher for a queue.
    pub fn new(queue: Arc<EventQueue>, consumer: C) -> Self {
        Self {
            queue,
            status: None,
            consumer,
            ticks: 0,
        }
    }

    /// Report faults of the source behind `status` to the consumer.
    pub fn with_status(mut self, status: Arc<WatchStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Get the consumer.
    pub fn consumer(&self) -> &C {
        &self.consumer
    }

    /// Take back the consumer.
    pub fn into_consumer(self) -> C {
        self.consumer
    }

    /// Drain everything queued and deliver it. Never waits for events.
    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport::default();

        for event in self.queue.drain_all() {
            match self.deliver(&event) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(
                        path = event.path(),
                        kind = %event.kind(),
                        "Consumer callback failed: {err:#}"
                    );
                }
            }
        }

        if let Some(fault) = self.status.as_ref().and_then(|s| s.take_fault()) {
            self.consumer.on_fault(&fault);
            report.fault = Some(fault);
        }

        report
    }

    /// Tick every `interval` until `cancel` fires or the watcher halts, then
    /// return the consumer.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) -> C {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Dispatch loop cancelled after {} ticks", self.ticks);
                    break;
                }
                _ = ticker.tick() => {
                    let report = self.tick();
                    if report.drained() > 0 {
                        debug!(
                            "Tick {}: delivered {}, failed {}",
                            self.ticks, report.delivered, report.failed
                        );
                    }
                    if report.fault.is_some() {
                        info!("Dispatch loop ending: watcher halted");
                        break;
                    }
                }
            }
        }

        self.consumer
    }

    fn deliver(&mut self, event: &ChangeEvent) -> anyhow::Result<()> {
        let consumer = &mut self.consumer;
        panic::catch_unwind(AssertUnwindSafe(|| {
            consumer.on_event(event.path(), event.kind())
        }))
        .unwrap_or_else(|payload| {
            Err(anyhow!("consumer panicked: {}", panic_message(&*payload)))
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
