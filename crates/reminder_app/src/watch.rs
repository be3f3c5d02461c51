use std::path::Path;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ResolvedPaths;
use crate::notes::is_note_file;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Notes,
    Settings,
}

/// Watches the notes tree and the settings file, forwarding classified
/// changes. Dropping the returned watcher stops the stream.
pub fn spawn_watcher(
    paths: &ResolvedPaths,
    changes: mpsc::UnboundedSender<Change>,
) -> Result<RecommendedWatcher> {
    let classifier = paths.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let event = match res {
            Ok(event) => event,
            Err(err) => {
                warn!(%err, "filesystem watcher error");
                return;
            }
        };
        if let Some(change) = classify(&classifier, &event) {
            debug!(?change, paths = ?event.paths, "filesystem change detected");
            let _ = changes.send(change);
        }
    })?;

    watcher
        .watch(&paths.notes_root, RecursiveMode::Recursive)
        .with_context(|| format!("unable to watch {}", paths.notes_root.display()))?;
    if let Some(dir) = paths.settings.parent() {
        if !dir.starts_with(&paths.notes_root) {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .with_context(|| format!("unable to watch {}", dir.display()))?;
        }
    }
    Ok(watcher)
}

pub fn classify(paths: &ResolvedPaths, event: &Event) -> Option<Change> {
    if matches!(event.kind, EventKind::Access(_)) {
        return None;
    }
    if event.paths.iter().any(|path| path == &paths.settings) {
        return Some(Change::Settings);
    }
    event
        .paths
        .iter()
        .any(|path| is_watched_note(&paths.notes_root, path))
        .then_some(Change::Notes)
}

fn is_watched_note(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let hidden = relative.components().any(|part| {
        part.as_os_str()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
    });
    !hidden && is_note_file(path)
}
