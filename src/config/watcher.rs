use super::store::{ConfigStore, ReloadReport};
use crate::error::ConfigError;
use notify::{Event, PollWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;

/// Reloads the store whenever its backing file changes.
///
/// Change detection runs on a `notify` poll watcher that compares file
/// contents as well as mtimes, so rewrites landing inside one mtime tick
/// are still seen. Events are forwarded into the async loop over a channel.
pub struct ConfigWatcher {
    store: Arc<ConfigStore>,
    path: PathBuf,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    _watcher: PollWatcher,
}

impl ConfigWatcher {
    /// Start watching the file the store was loaded from
    pub fn new(store: Arc<ConfigStore>, poll: Duration) -> Result<Self, ConfigError> {
        let path = store
            .path()
            .ok_or(ConfigError::NoBackingFile)?
            .to_path_buf();

        let (tx, events) = mpsc::unbounded_channel();
        let config = notify::Config::default()
            .with_poll_interval(poll)
            .with_compare_contents(true);
        let mut watcher = PollWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            config,
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), poll_ms = poll.as_millis() as u64, "Config watcher started");
        Ok(Self {
            store,
            path,
            events,
            _watcher: watcher,
        })
    }

    /// Whether `event` should trigger a reload
    fn is_relevant(&self, event: &Event) -> bool {
        (event.kind.is_modify() || event.kind.is_create())
            && (event.paths.is_empty() || event.paths.iter().any(|p| p == &self.path))
    }

    /// Handle one watcher event. `Ok(None)` when the event is not a change to the file.
    pub async fn handle(&mut self, event: notify::Result<Event>) -> Result<Option<ReloadReport>, ConfigError> {
        let event = event?;
        if !self.is_relevant(&event) {
            return Ok(None);
        }

        // Collapse a burst of events from one save into a single reload
        while let Ok(next) = self.events.try_recv() {
            if let Err(e) = next {
                tracing::warn!(error = %e, "Config watcher error");
            }
        }

        reload(Arc::clone(&self.store)).await.map(Some)
    }

    /// Run until `shutdown` flips to true. Reload errors keep the active snapshot.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = self.events.recv() => {
                    let Some(event) = event else {
                        tracing::warn!("Config watcher channel closed");
                        break;
                    };
                    if let Err(e) = self.handle(event).await {
                        tracing::error!(error = %e, "Failed to reload configuration, keeping current snapshot");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Config watcher stopped");
    }
}

/// Re-read the backing file off the async runtime. Only a successful reload is reported.
async fn reload(store: Arc<ConfigStore>) -> Result<ReloadReport, ConfigError> {
    let report = tokio::task::spawn_blocking(move || store.reload())
        .await
        .map_err(|e| ConfigError::ReloadTask(e.to_string()))??;

    tracing::info!(
        version = report.version,
        active = report.active,
        quarantined = report.quarantined,
        excluded = report.excluded,
        "Configuration reloaded"
    );
    Ok(report)
}
