//! Live filesystem watching
//!
//! Each known directory is watched non-recursively. Directories created
//! after startup are not picked up until the next run.

use crate::filter::InclusionFilter;
use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, trace};

const EVENT_BUFFER: usize = 256;

/// What the supervising loop needs to react to.
#[derive(Debug)]
pub enum WatchEvent {
    /// A qualifying file was created or renamed into place
    Appeared(PathBuf),
    /// An error reported by the platform watcher
    Failed(notify::Error),
}

pub struct DirectoryWatcher {
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<notify::Result<Event>>,
    filter: InclusionFilter,
    pending: VecDeque<WatchEvent>,
}

impl DirectoryWatcher {
    /// Start watching every directory in `directories`.
    pub fn start(directories: &[PathBuf], filter: InclusionFilter) -> notify::Result<Self> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // Receiver gone means the loop has stopped
                let _ = tx.blocking_send(res);
            },
            Config::default(),
        )?;

        for dir in directories {
            watcher.watch(dir, RecursiveMode::NonRecursive)?;
            debug!(dir = %dir.display(), "Watching");
        }

        Ok(Self {
            _watcher: watcher,
            rx,
            filter,
            pending: VecDeque::new(),
        })
    }

    /// Next qualifying event, in arrival order. `None` once the platform
    /// watcher has shut down.
    pub async fn next_event(&mut self) -> Option<WatchEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            match self.rx.recv().await? {
                Ok(event) => {
                    for path in appeared_paths(&event) {
                        if self.filter.includes(path) {
                            self.pending.push_back(WatchEvent::Appeared(path.to_path_buf()));
                        } else {
                            trace!(path = %path.display(), "Ignoring excluded path");
                        }
                    }
                }
                Err(e) => return Some(WatchEvent::Failed(e)),
            }
        }
    }
}

/// Paths a notify event reports as newly present.
///
/// Creations and rename destinations count. The combined `Both` rename
/// event is skipped since its `To` half is delivered on its own; an
/// ambiguous rename is passed through and the open check downstream
/// discards departures.
fn appeared_paths(event: &Event) -> Vec<&Path> {
    match event.kind {
        EventKind::Create(_) => event.paths.iter().map(PathBuf::as_path).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both | RenameMode::From)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(_)) => {
            event.paths.iter().map(PathBuf::as_path).collect()
        }
        _ => Vec::new(),
    }
}
