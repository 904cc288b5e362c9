//! Integration tests against the real OS change backend.
//!
//! Backends deliver asynchronously, so every test polls with a generous
//! deadline instead of asserting right after the filesystem call.

use std::fs::{self, File};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use io_events_watcher::{
    ChangeEvent, DirectoryWatcher, EventKind, PathMode, RuntimeError, WatchConfig, WatchScope,
    WatcherError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const DEADLINE: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(300);

fn start(root: &Path) -> DirectoryWatcher {
    DirectoryWatcher::start(WatchConfig::new(root).with_path_mode(PathMode::RootNamed)).unwrap()
}

/// Drain until `done` holds for everything seen so far, then keep draining
/// briefly to catch duplicates.
fn collect_until(
    watcher: &DirectoryWatcher,
    mut done: impl FnMut(&[ChangeEvent]) -> bool,
) -> Vec<ChangeEvent> {
    let deadline = Instant::now() + DEADLINE;
    let mut seen = Vec::new();
    while Instant::now() < deadline {
        seen.extend(watcher.drain());
        if done(&seen) {
            thread::sleep(SETTLE);
            seen.extend(watcher.drain());
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    seen
}

fn count(events: &[ChangeEvent], path: &str, kind: EventKind) -> usize {
    events
        .iter()
        .filter(|e| e.path() == path && e.kind() == kind)
        .count()
}

fn position(events: &[ChangeEvent], path: &str, kind: EventKind) -> Option<usize> {
    events
        .iter()
        .position(|e| e.path() == path && e.kind() == kind)
}

fn root_named(temp_dir: &TempDir, name: &str) -> (std::path::PathBuf, String) {
    let root = temp_dir.path().join(name);
    fs::create_dir(&root).unwrap();
    (root, name.to_string())
}

#[test]
fn test_created_file_reported_once() {
    let temp_dir = TempDir::new().unwrap();
    let (root, name) = root_named(&temp_dir, "watched");
    let mut watcher = start(&root);

    File::create(root.join("a.txt")).unwrap();

    let expected = format!("{name}/a.txt");
    let events = collect_until(&watcher, |seen| {
        count(seen, &expected, EventKind::Created) > 0
    });
    assert_eq!(count(&events, &expected, EventKind::Created), 1);
    assert!(events.iter().all(|e| !e.path().contains('\\')));

    watcher.stop().unwrap();
}

#[test]
fn test_nested_paths_use_forward_slashes() {
    let temp_dir = TempDir::new().unwrap();
    let (root, name) = root_named(&temp_dir, "watched");
    fs::create_dir(root.join("sub")).unwrap();
    let watcher = start(&root);

    File::create(root.join("sub").join("deep.txt")).unwrap();

    let expected = format!("{name}/sub/deep.txt");
    let events = collect_until(&watcher, |seen| {
        count(seen, &expected, EventKind::Created) > 0
    });
    assert_eq!(count(&events, &expected, EventKind::Created), 1);
}

#[test]
fn test_deleted_file_reported() {
    let temp_dir = TempDir::new().unwrap();
    let (root, name) = root_named(&temp_dir, "watched");
    File::create(root.join("gone.txt")).unwrap();
    let watcher = start(&root);

    fs::remove_file(root.join("gone.txt")).unwrap();

    let expected = format!("{name}/gone.txt");
    let events = collect_until(&watcher, |seen| {
        count(seen, &expected, EventKind::Deleted) > 0
    });
    assert_eq!(count(&events, &expected, EventKind::Deleted), 1);
}

#[cfg(target_os = "linux")]
#[test]
fn test_rename_reports_old_before_new() {
    let temp_dir = TempDir::new().unwrap();
    let (root, name) = root_named(&temp_dir, "watched");
    File::create(root.join("a.txt")).unwrap();
    let watcher = start(&root);

    fs::rename(root.join("a.txt"), root.join("b.txt")).unwrap();

    let old = format!("{name}/a.txt");
    let new = format!("{name}/b.txt");
    let events = collect_until(&watcher, |seen| {
        count(seen, &new, EventKind::RenamedTo) > 0
    });

    assert_eq!(count(&events, &old, EventKind::RenamedFrom), 1);
    assert_eq!(count(&events, &new, EventKind::RenamedTo), 1);
    assert!(
        position(&events, &old, EventKind::RenamedFrom)
            < position(&events, &new, EventKind::RenamedTo)
    );
}

#[test]
fn test_missing_root_then_created() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("later");

    let err = DirectoryWatcher::start(WatchConfig::new(&root)).unwrap_err();
    assert!(matches!(err, WatcherError::Setup(_)));

    fs::create_dir(&root).unwrap();
    let mut watcher = DirectoryWatcher::start(WatchConfig::new(&root)).unwrap();
    assert!(watcher.is_running());
    watcher.stop().unwrap();
}

#[test]
fn test_stop_while_idle_does_not_hang() {
    let temp_dir = TempDir::new().unwrap();
    let mut watcher = start(temp_dir.path());

    // Nothing has changed, so the wait thread is blocked in its receive.
    let (done_tx, done_rx) = mpsc::channel();
    let stopper = thread::spawn(move || {
        let result = watcher.stop();
        let _ = done_tx.send(result.is_ok());
        watcher
    });

    assert_eq!(done_rx.recv_timeout(DEADLINE), Ok(true));
    let watcher = stopper.join().unwrap();
    assert!(!watcher.is_running());
}

#[test]
fn test_independent_watchers() {
    let temp_dir = TempDir::new().unwrap();
    let (left_root, left) = root_named(&temp_dir, "left");
    let (right_root, right) = root_named(&temp_dir, "right");
    let left_watcher = start(&left_root);
    let right_watcher = start(&right_root);

    File::create(left_root.join("l.txt")).unwrap();
    File::create(right_root.join("r.txt")).unwrap();

    let left_events = collect_until(&left_watcher, |seen| {
        count(seen, &format!("{left}/l.txt"), EventKind::Created) > 0
    });
    let right_events = collect_until(&right_watcher, |seen| {
        count(seen, &format!("{right}/r.txt"), EventKind::Created) > 0
    });

    assert!(left_events.iter().all(|e| e.path().starts_with(&left)));
    assert!(right_events.iter().all(|e| e.path().starts_with(&right)));
    assert_eq!(count(&left_events, &format!("{left}/l.txt"), EventKind::Created), 1);
    assert_eq!(count(&right_events, &format!("{right}/r.txt"), EventKind::Created), 1);
}

#[test]
fn test_top_level_scope_skips_subdirectories() {
    let temp_dir = TempDir::new().unwrap();
    let (root, _) = root_named(&temp_dir, "watched");
    fs::create_dir(root.join("sub")).unwrap();
    let watcher = DirectoryWatcher::start(
        WatchConfig::new(&root)
            .with_path_mode(PathMode::RootRelative)
            .with_scope(WatchScope::TopLevel),
    )
    .unwrap();

    File::create(root.join("sub").join("deep.txt")).unwrap();
    File::create(root.join("top.txt")).unwrap();

    let events = collect_until(&watcher, |seen| {
        count(seen, "top.txt", EventKind::Created) > 0
    });
    assert_eq!(count(&events, "top.txt", EventKind::Created), 1);
    assert!(
        events.iter().all(|e| !e.path().starts_with("sub/")),
        "{events:?}"
    );
}

#[test]
fn test_root_moved_away_and_recreated_halts() {
    let temp_dir = TempDir::new().unwrap();
    let (root, _) = root_named(&temp_dir, "watched");
    let watcher = start(&root);
    let status = watcher.status();

    fs::rename(&root, temp_dir.path().join("moved")).unwrap();
    fs::create_dir(&root).unwrap();
    File::create(root.join("x.txt")).unwrap();

    let deadline = Instant::now() + DEADLINE;
    while !status.is_halted() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert!(!watcher.is_running());
    assert!(matches!(
        status.take_fault(),
        Some(RuntimeError::RearmFailed { .. })
    ));
}

#[test]
fn test_exclude_patterns_drop_matches() {
    let temp_dir = TempDir::new().unwrap();
    let (root, name) = root_named(&temp_dir, "watched");
    let watcher = DirectoryWatcher::start(
        WatchConfig::new(&root)
            .with_path_mode(PathMode::RootNamed)
            .exclude("*.tmp"),
    )
    .unwrap();

    File::create(root.join("skip.tmp")).unwrap();
    File::create(root.join("keep.txt")).unwrap();

    let kept = format!("{name}/keep.txt");
    let events = collect_until(&watcher, |seen| {
        count(seen, &kept, EventKind::Created) > 0
    });
    assert_eq!(count(&events, &kept, EventKind::Created), 1);
    assert!(events.iter().all(|e| !e.path().ends_with(".tmp")));
}

#[test]
fn test_stats_track_delivery() {
    let temp_dir = TempDir::new().unwrap();
    let watcher = start(temp_dir.path());

    File::create(temp_dir.path().join("counted.txt")).unwrap();
    let events = collect_until(&watcher, |seen| !seen.is_empty());

    let stats = watcher.stats();
    assert!(stats.running);
    assert!(stats.records > 0);
    assert_eq!(stats.queue.drained, events.len() as u64);
    assert!(stats.queue.pushed >= stats.queue.drained);
}
