use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// Events for the same path closer together than this are collapsed.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Entries older than this are dropped once the debounce map grows.
const DEBOUNCE_RETENTION: Duration = Duration::from_secs(5);
const DEBOUNCE_PRUNE_THRESHOLD: usize = 100;

/// Sent when a watched note is created or modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChanged {
    pub path: PathBuf,
}

type DebounceMap = Arc<Mutex<HashMap<PathBuf, Instant>>>;

/// Record an event for `path` at `now` and report whether it should be
/// delivered.
pub fn debounce(map: &mut HashMap<PathBuf, Instant>, path: &Path, now: Instant, window: Duration) -> bool {
    if map.len() > DEBOUNCE_PRUNE_THRESHOLD {
        map.retain(|_, last| now.duration_since(*last) < DEBOUNCE_RETENTION);
    }

    if let Some(last) = map.get(path) {
        if now.duration_since(*last) < window {
            return false;
        }
    }
    map.insert(path.to_path_buf(), now);
    true
}

fn is_forwarded_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Watches individual note files and reports changes on a channel.
///
/// The underlying OS watcher is created on the first `watch` call.
pub struct NoteWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    watched: Arc<Mutex<HashSet<PathBuf>>>,
    debounce_map: DebounceMap,
    sender: UnboundedSender<FileChanged>,
}

impl NoteWatcher {
    pub fn new() -> (Self, UnboundedReceiver<FileChanged>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let watcher = Self {
            watcher: Mutex::new(None),
            watched: Arc::new(Mutex::new(HashSet::new())),
            debounce_map: Arc::new(Mutex::new(HashMap::new())),
            sender,
        };
        (watcher, receiver)
    }

    fn setup(&self) -> notify::Result<RecommendedWatcher> {
        let watched = Arc::clone(&self.watched);
        let debounce_map = Arc::clone(&self.debounce_map);
        let sender = self.sender.clone();

        RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("File watcher error: {}", e);
                        return;
                    }
                };
                if !is_forwarded_kind(&event.kind) {
                    return;
                }

                for path in event.paths {
                    if path.extension().map_or(true, |ext| ext != "md") {
                        continue;
                    }
                    if !watched.lock().expect("watched set mutex").contains(&path) {
                        continue;
                    }
                    {
                        let mut map = debounce_map.lock().expect("debounce map mutex");
                        if !debounce(&mut map, &path, Instant::now(), DEBOUNCE_WINDOW) {
                            continue;
                        }
                    }
                    // receiver gone means nobody is listening any more
                    let _ = sender.send(FileChanged { path });
                }
            },
            Config::default(),
        )
    }

    /// Start watching `path`. Watching an already watched path is a no-op.
    /// Returns false when the OS watcher could not be set up.
    pub fn watch(&self, path: &Path) -> bool {
        if self.is_watching(path) {
            return true;
        }

        let mut slot = self.watcher.lock().expect("file watcher mutex");
        if slot.is_none() {
            match self.setup() {
                Ok(w) => *slot = Some(w),
                Err(e) => {
                    warn!("Failed to start file watcher: {}", e);
                    return false;
                }
            }
        }
        let Some(watcher) = slot.as_mut() else {
            return false;
        };

        if let Err(e) = watcher.watch(path, RecursiveMode::NonRecursive) {
            warn!("Failed to watch {}: {}", path.display(), e);
            return false;
        }
        self.watched.lock().expect("watched set mutex").insert(path.to_path_buf());
        debug!("Watching {}", path.display());
        true
    }

    /// Stop watching `path`. Always succeeds, including for paths that were
    /// never watched.
    pub fn unwatch(&self, path: &Path) -> bool {
        let was_watched = self.watched.lock().expect("watched set mutex").remove(path);
        if was_watched {
            if let Some(watcher) = self.watcher.lock().expect("file watcher mutex").as_mut() {
                if let Err(e) = watcher.unwatch(path) {
                    debug!("Unwatch {} failed: {}", path.display(), e);
                }
            }
            self.debounce_map.lock().expect("debounce map mutex").remove(path);
        }
        true
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.lock().expect("watched set mutex").contains(path)
    }

    pub fn watched_count(&self) -> usize {
        self.watched.lock().expect("watched set mutex").len()
    }
}
