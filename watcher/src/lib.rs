//! # IO Events Watcher
//!
//! This crate watches one directory subtree and turns the OS change
//! notifications into an ordered stream of [`ChangeEvent`]s that a consumer
//! drains on its own schedule.
//!
//! ## Features
//!
//! - **Dedicated Wait Thread**: Blocks on the OS backend, never on the consumer
//! - **Closed Event Vocabulary**: `CREATED`, `MODIFIED`, `DELETED`,
//!   `RENAMED_OLD`, `RENAMED_NEW`, `UNKNOWN`
//! - **Forward-Slash Paths**: On every platform
//! - **Periodic Drain**: One consumer call per event per tick, in order
//! - **Exclusion Patterns**: Optional, off by default
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        IO Events Watcher                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  notify ──► ChangeSource ──► Normalizer ──► EventQueue          │
//! │              (wait thread)                      │               │
//! │                                                 ▼               │
//! │  HostModule ──► DirectoryWatcher ──► Dispatcher ──► consumer    │
//! │                                      (tick)                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod filter;
pub mod lifecycle;
pub mod normalize;
pub mod queue;
pub mod root;
pub mod source;
pub mod watcher;

pub use config::{DEFAULT_TICK_INTERVAL, PathMode, WatchConfig, WatchScope};
pub use dispatch::{Dispatcher, EventConsumer, TickReport};
pub use error::{Result, RuntimeError, SetupError, WatcherError};
pub use event::{ChangeEvent, EventKind};
pub use filter::PathFilter;
pub use lifecycle::{HostModule, TickDriver};
pub use normalize::Normalizer;
pub use queue::{EventQueue, QueueStats};
pub use root::{FixedRoot, MarkerRoot, RootProvider};
pub use source::{ChangeSource, WatchStatus};
pub use watcher::{DirectoryWatcher, WatcherStats};
