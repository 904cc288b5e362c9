//! `io-events`: print the changes under a directory until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use io_events_watcher::{
    DirectoryWatcher, FixedRoot, MarkerRoot, PathMode, RootProvider, WatchConfig, WatchScope,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod printer;

use printer::{Format, Printer};

#[derive(Parser)]
#[command(name = "io-events", version)]
#[command(about = "Watch a directory and report its changes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one line per change, drained at a fixed interval
    Watch(WatchArgs),
}

#[derive(Args)]
struct WatchArgs {
    /// Directory to watch (defaults to the config file's root, then ".")
    root: Option<PathBuf>,

    /// Walk up from the current directory to the first one containing this
    /// subdirectory and watch that
    #[arg(long, conflicts_with = "root")]
    marker: Option<String>,

    /// Milliseconds between drains
    #[arg(long)]
    interval_ms: Option<u64>,

    /// How paths are printed
    #[arg(long, value_enum)]
    path_mode: Option<PathModeArg>,

    /// How much of the tree is watched
    #[arg(long, value_enum)]
    scope: Option<ScopeArg>,

    /// Skip paths matching this pattern (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// TOML file with watch settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum PathModeArg {
    Absolute,
    RootNamed,
    RootRelative,
}

impl From<PathModeArg> for PathMode {
    fn from(arg: PathModeArg) -> Self {
        match arg {
            PathModeArg::Absolute => Self::Absolute,
            PathModeArg::RootNamed => Self::RootNamed,
            PathModeArg::RootRelative => Self::RootRelative,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Subtree,
    TopLevel,
}

impl From<ScopeArg> for WatchScope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Subtree => Self::Subtree,
            ScopeArg::TopLevel => Self::TopLevel,
        }
    }
}

impl WatchArgs {
    /// Merge the config file (if any) with the flags; flags win.
    fn into_config(self) -> Result<WatchConfig> {
        let mut config = match &self.config {
            Some(path) => WatchConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => WatchConfig::new("."),
        };

        if let Some(root) = self.root {
            config.root = FixedRoot::new(root).root()?;
        } else if let Some(marker) = self.marker {
            config.root = MarkerRoot::new(marker).root()?;
        }
        if let Some(ms) = self.interval_ms {
            config.tick_interval_ms = ms;
        }
        if let Some(mode) = self.path_mode {
            config.path_mode = mode.into();
        }
        if let Some(scope) = self.scope {
            config.scope = scope.into();
        }
        config.exclude_patterns.extend(self.exclude);

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Watch(args) => watch(args).await,
    }
}

async fn watch(args: WatchArgs) -> Result<()> {
    let format = if args.json { Format::Json } else { Format::Text };
    let config = args.into_config()?;
    let interval = config.tick_interval();

    let mut watcher = DirectoryWatcher::start(config).context("failed to start watching")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupted, stopping");
                    cancel.cancel();
                }
                Err(e) => warn!("Cannot listen for Ctrl-C: {e}"),
            }
        }
    });

    let printer = watcher.dispatcher(Printer::new(format)).run(interval, cancel).await;
    watcher.stop()?;

    if let Some(fault) = printer.fault() {
        bail!("watcher halted: {fault}");
    }
    Ok(())
}
