//! Watches the content directory for filesystem changes and triggers reloads.
//!
//! Reacts to create, remove, and rename events only — plain data-modify events are ignored
//! since assets are content-addressed and therefore immutable once written. Bursts of events
//! collapse into a single reload by draining the channel before acting.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::loader::DiskLoader;

/// Spawns the background task that watches `content_directory` and reloads the
/// [`DiskLoader`] whenever a relevant change settles.
pub fn spawn(content_directory: PathBuf, loader: Arc<DiskLoader>) {
    tokio::spawn(async move {
        if let Err(err) = run(content_directory, loader).await {
            error!(error = %err, "content watcher exited");
        }
    });
}

async fn run(content_directory: PathBuf, loader: Arc<DiskLoader>) -> notify::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(err) => warn!(error = %err, "filesystem watch error"),
        },
        notify::Config::default(),
    )?;

    watcher.watch(&content_directory, RecursiveMode::NonRecursive)?;

    let mut watched_websites = HashSet::new();
    if let Ok(mut entries) = tokio::fs::read_dir(&content_directory).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() {
                if watcher
                    .watch(&path, RecursiveMode::NonRecursive)
                    .is_ok()
                {
                    watched_websites.insert(path);
                }
            }
        }
    }

    while let Some(event) = rx.recv().await {
        if !is_relevant(&event.kind) {
            continue;
        }

        let mut should_reload = false;
        for path in &event.paths {
            if is_temp_path(path) {
                continue;
            }
            if path.is_dir() && !watched_websites.contains(path) {
                if watcher.watch(path, RecursiveMode::NonRecursive).is_ok() {
                    watched_websites.insert(path.clone());
                }
            }
            should_reload = true;
        }

        if should_reload {
            // Drain any further events already queued so a burst of creates collapses into
            // a single reload.
            while rx.try_recv().is_ok() {}
            if let Err(err) = loader.reload().await {
                error!(error = %err, "reload triggered by filesystem watcher failed");
            }
        }
    }

    Ok(())
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(notify::event::ModifyKind::Name(_))
    )
}

fn is_temp_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains("temp"))
}
