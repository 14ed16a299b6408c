// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use lupa_app::parse_and_classify;
use lupa_tui::InternalEvent;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, warn};

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(150);
const REREGISTER_BACKOFF: Duration = Duration::from_secs(2);

pub fn spawn_data_watcher(path: PathBuf, tx: Sender<InternalEvent>) {
    thread::spawn(move || {
        if path.exists() {
            post_data_file(&path, &tx);
        }
        watch_forever(
            path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")),
            tx.clone(),
            move |event, tx| {
                let ours = event
                    .paths
                    .iter()
                    .any(|changed| changed.file_name() == path.file_name());
                if !ours {
                    return true;
                }
                if path.exists() {
                    post_data_file(&path, tx)
                } else {
                    tx.send(InternalEvent::DataFileRemoved).is_ok()
                }
            },
        );
    });
}

pub fn spawn_history_watcher(dir: PathBuf, tx: Sender<InternalEvent>) {
    thread::spawn(move || {
        watch_forever(dir, tx, |_event, tx| {
            tx.send(InternalEvent::HistoryChanged).is_ok()
        });
    });
}

pub fn load_snapshot(path: &Path) -> Result<Option<lupa_app::Snapshot>> {
    let raw = match fs::read(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(error).with_context(|| format!("read data file {}", path.display()));
        }
    };
    let snapshot = parse_and_classify(&raw, OffsetDateTime::now_utc())
        .map_err(|error| anyhow::anyhow!("{error}"))?;
    Ok(Some(snapshot))
}

fn post_data_file(path: &Path, tx: &Sender<InternalEvent>) -> bool {
    match load_snapshot(path) {
        Ok(Some(snapshot)) => {
            debug!(title = %snapshot.title, rows = snapshot.rows.len(), "snapshot ingested");
            tx.send(InternalEvent::SnapshotLoaded(Box::new(snapshot))).is_ok()
        }
        Ok(None) => tx.send(InternalEvent::DataFileRemoved).is_ok(),
        Err(error) => {
            // A writer mid-flight produces unparseable bytes; the previous
            // snapshot stays current and the next event retries.
            warn!(path = %path.display(), %error, "snapshot rejected");
            tx.send(InternalEvent::SnapshotRejected(error.to_string()))
                .is_ok()
        }
    }
}

fn watch_forever<F>(root: PathBuf, tx: Sender<InternalEvent>, mut on_change: F)
where
    F: FnMut(&notify::Event, &Sender<InternalEvent>) -> bool,
{
    let mut reported = false;
    loop {
        let events = match register(&root) {
            Ok(events) => {
                reported = false;
                events
            }
            Err(error) => {
                // Report the first failure, then keep retrying quietly.
                if !reported {
                    warn!(root = %root.display(), %error, "watch registration failed");
                    let _ = tx.send(InternalEvent::WatcherStalled(error.to_string()));
                    reported = true;
                }
                thread::sleep(REREGISTER_BACKOFF);
                continue;
            }
        };

        let (_watcher, raw_rx) = events;
        loop {
            let event = match raw_rx.recv() {
                Ok(Ok(event)) => event,
                Ok(Err(error)) => {
                    warn!(root = %root.display(), %error, "watch stream error");
                    continue;
                }
                // Watcher dropped or backend died; fall through to re-register.
                Err(_) => break,
            };

            let merged = debounce(&raw_rx, event);
            if !on_change(&merged, &tx) {
                // The UI is gone; stop watching.
                return;
            }
        }
        thread::sleep(REREGISTER_BACKOFF);
    }
}

fn register(root: &Path) -> Result<(RecommendedWatcher, Receiver<notify::Result<notify::Event>>)> {
    fs::create_dir_all(root)
        .with_context(|| format!("create watched directory {}", root.display()))?;

    let (raw_tx, raw_rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |result| {
        let _ = raw_tx.send(result);
    })
    .context("create filesystem watcher")?;
    watcher
        .watch(root, RecursiveMode::NonRecursive)
        .with_context(|| format!("watch {}", root.display()))?;
    Ok((watcher, raw_rx))
}

// Coalesce the burst a single logical write produces into one event.
fn debounce(
    rx: &Receiver<notify::Result<notify::Event>>,
    first: notify::Event,
) -> notify::Event {
    let mut merged = first;
    loop {
        match rx.recv_timeout(DEBOUNCE_WINDOW) {
            Ok(Ok(event)) => {
                for path in event.paths {
                    if !merged.paths.contains(&path) {
                        merged.paths.push(path);
                    }
                }
            }
            Ok(Err(_)) | Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    merged
}
