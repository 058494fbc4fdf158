//! File watcher for file-backed config sources.
//!
//! Watches the directory of every source that reports a `watch_path`,
//! reloads the matching source when its file changes, and publishes
//! the outcome through a tokio watch channel. Uses debouncing to coalesce
//! rapid file changes.

use crate::builder::Config;
use crate::node::SourceId;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Outcome of a file change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceChangeEvent {
    /// The source was reloaded and the new roots published.
    Reloaded { source: SourceId, path: PathBuf },
    /// The file changed but reloading it failed; the previous config stays.
    ReloadFailed { source: SourceId, path: PathBuf, reason: String },
    /// Watcher encountered an error
    Error(String),
}

impl SourceChangeEvent {
    pub fn is_reload(&self) -> bool {
        matches!(self, SourceChangeEvent::Reloaded { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            SourceChangeEvent::Reloaded { path, .. } | SourceChangeEvent::ReloadFailed { path, .. } => {
                Some(path)
            }
            SourceChangeEvent::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Debounce duration for coalescing rapid changes.
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(500),
        }
    }
}

/// Handle to a running source watcher. Dropping it stops event delivery.
pub struct SourceWatcherHandle {
    pub events: watch::Receiver<Option<SourceChangeEvent>>,
    _task_handle: tokio::task::JoinHandle<()>,
}

impl SourceWatcherHandle {
    /// Wait for the next change event.
    pub async fn wait_for_change(&mut self) -> Option<SourceChangeEvent> {
        loop {
            if self.events.changed().await.is_err() {
                return None;
            }
            let event = self.events.borrow().clone();
            if event.is_some() {
                return event;
            }
        }
    }

    pub fn latest_event(&self) -> Option<SourceChangeEvent> {
        self.events.borrow().clone()
    }
}

/// A watched file and the source it belongs to.
#[derive(Debug, Clone)]
struct WatchedFile {
    source: SourceId,
    path: PathBuf,
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Canonical form of a watched file. The file may not exist yet, so the
/// parent directory is canonicalized and the file name appended.
fn canonical_file(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => canonical(parent).join(name),
        _ => canonical(path),
    }
}

fn sources_for_path<'a>(path: &Path, files: &'a [WatchedFile]) -> Vec<&'a WatchedFile> {
    let changed = canonical_file(path);
    files.iter().filter(|f| f.path == changed).collect()
}

/// Start watching every file-backed source of `config`.
///
/// Requires a tokio runtime: event handling runs on a blocking task.
pub fn start_source_watcher(
    config: Arc<Config>,
    watcher_config: WatcherConfig,
) -> Result<SourceWatcherHandle, notify::Error> {
    let (event_tx, event_rx) = watch::channel(None);
    let (notify_tx, notify_rx) = mpsc::channel();

    let mut debouncer = new_debouncer(watcher_config.debounce_duration, notify_tx)?;
    let watcher = debouncer.watcher();

    let mut files = Vec::new();
    let mut dirs: Vec<PathBuf> = Vec::new();
    for source in config.sources() {
        let Some(path) = source.watch_path() else {
            continue;
        };
        let file = canonical_file(path);
        let dir = file.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
        if !dir.exists() {
            warn!("Config directory does not exist, skipping watch: {}", dir.display());
            continue;
        }
        if !dirs.contains(&dir) {
            info!("Watching config directory: {}", dir.display());
            watcher.watch(&dir, notify::RecursiveMode::NonRecursive)?;
            dirs.push(dir);
        }
        files.push(WatchedFile {
            source: source.id(),
            path: file,
        });
    }

    let task_handle = tokio::task::spawn_blocking(move || {
        // Keep the debouncer alive
        let _debouncer = debouncer;
        process_notify_events(notify_rx, event_tx, &config, &files);
    });

    Ok(SourceWatcherHandle {
        events: event_rx,
        _task_handle: task_handle,
    })
}

fn process_notify_events(
    rx: mpsc::Receiver<Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>>,
    tx: watch::Sender<Option<SourceChangeEvent>>,
    config: &Config,
    files: &[WatchedFile],
) {
    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                for event in reload_changed(events, config, files) {
                    debug!("Config source change: {:?}", event);
                    if tx.send(Some(event)).is_err() {
                        info!("Source watcher receiver dropped, stopping");
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                error!("File watcher error: {}", e);
                let _ = tx.send(Some(SourceChangeEvent::Error(e.to_string())));
            }
            Err(_) => {
                info!("Source watcher channel closed, stopping");
                return;
            }
        }
    }
}

/// Reload each source whose file appears in `events`, once per batch.
fn reload_changed(
    events: Vec<notify_debouncer_mini::DebouncedEvent>,
    config: &Config,
    files: &[WatchedFile],
) -> Vec<SourceChangeEvent> {
    let mut reloaded: Vec<SourceId> = Vec::new();
    let mut result = Vec::new();
    for event in events {
        if !matches!(
            event.kind,
            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous
        ) {
            continue;
        }
        for file in sources_for_path(&event.path, files) {
            if reloaded.contains(&file.source) {
                continue;
            }
            reloaded.push(file.source);
            let change = match config.reload_source(file.source) {
                Ok(_) => SourceChangeEvent::Reloaded {
                    source: file.source,
                    path: file.path.clone(),
                },
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "Config reload failed");
                    SourceChangeEvent::ReloadFailed {
                        source: file.source,
                        path: file.path.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            result.push(change);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ConfigBuilder;
    use crate::engine::ConfigProvider;
    use crate::source::{ConfigSource, FileConfigSource};
    use crate::tags::Tags;
    use notify_debouncer_mini::DebouncedEvent;

    #[test]
    fn test_sources_for_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceId::new();
        let files = vec![WatchedFile {
            source,
            path: canonical_file(&dir.path().join("app.yaml")),
        }];

        let hits = sources_for_path(&dir.path().join("app.yaml"), &files);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, source);
        assert!(sources_for_path(&dir.path().join("other.yaml"), &files).is_empty());
    }

    #[test]
    fn test_event_path() {
        let event = SourceChangeEvent::Reloaded {
            source: SourceId::new(),
            path: PathBuf::from("a.yaml"),
        };
        assert!(event.is_reload());
        assert_eq!(event.path(), Some(Path::new("a.yaml")));
        assert_eq!(SourceChangeEvent::Error("x".into()).path(), None);
    }

    #[test]
    fn test_reload_changed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.yaml");
        std::fs::write(&file, "name: before\n").unwrap();

        let source = FileConfigSource::new(&file);
        let id = source.id();
        let config = ConfigBuilder::new().add_source(source).build().unwrap();
        config.load_configs().unwrap();

        std::fs::write(&file, "name: after\n").unwrap();
        let files = vec![WatchedFile {
            source: id,
            path: canonical_file(&file),
        }];
        let events = vec![
            DebouncedEvent {
                path: file.clone(),
                kind: DebouncedEventKind::Any,
            },
            DebouncedEvent {
                path: file.clone(),
                kind: DebouncedEventKind::Any,
            },
        ];
        let changes = reload_changed(events, &config, &files);
        assert_eq!(changes.len(), 1);
        assert!(changes[0].is_reload());
        assert_eq!(config.get_config::<String>("name", &Tags::new()).unwrap(), "after");

        std::fs::write(&file, "name: [broken\n").unwrap();
        let changes = reload_changed(
            vec![DebouncedEvent {
                path: file.clone(),
                kind: DebouncedEventKind::Any,
            }],
            &config,
            &files,
        );
        assert!(matches!(changes[0], SourceChangeEvent::ReloadFailed { .. }));
        assert_eq!(config.get_config::<String>("name", &Tags::new()).unwrap(), "after");
    }
}
