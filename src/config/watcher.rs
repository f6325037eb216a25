//! Configuration file watcher for hot reload.
//!
//! Filesystem events are forwarded from the `notify` callback thread into a
//! channel and handled one at a time by [`ConfigWatcher::drive`], so a reload
//! never overlaps another reload.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::config::store::ConfigStore;

/// Minimum time between a successful reload and the next attempt.
pub const RELOAD_COOLDOWN: Duration = Duration::from_millis(500);

/// Pause between an accepted event and the reload, so the writer can finish.
pub const SETTLE_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to watch config file: {0}")]
    Notify(#[from] notify::Error),
}

/// Cooldown gate measured from the last successful reload.
#[derive(Debug, Clone)]
pub struct Debouncer {
    last_reload: Instant,
    cooldown: Duration,
}

impl Debouncer {
    pub fn new(started: Instant, cooldown: Duration) -> Self {
        Self {
            last_reload: started,
            cooldown,
        }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_reload) >= self.cooldown
    }

    pub fn record_success(&mut self, at: Instant) {
        self.last_reload = at;
    }
}

/// Counters returned when the watcher stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WatcherStats {
    pub reloads: u64,
    pub failures: u64,
    pub dropped: u64,
}

/// A watcher that monitors the user configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    store: Arc<ConfigStore>,
    debouncer: Debouncer,
    settle_delay: Duration,
    stats: WatcherStats,
}

impl ConfigWatcher {
    pub fn new(store: Arc<ConfigStore>, path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            store,
            debouncer: Debouncer::new(Instant::now(), RELOAD_COOLDOWN),
            settle_delay: SETTLE_DELAY,
            stats: WatcherStats::default(),
        }
    }

    /// Watch the file until `stop` fires, then detach from the filesystem.
    pub async fn run(self, stop: oneshot::Receiver<()>) -> Result<WatcherStats, WatchError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let file_name = self.path.file_name().map(ToOwned::to_owned);
        let dir = watch_dir(&self.path);

        // Watching the directory keeps us attached across editors that
        // replace the file through a rename.
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let ours = event
                        .paths
                        .iter()
                        .any(|path| path.file_name() == file_name.as_deref());
                    if ours && is_write_event(&event.kind) {
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Watch error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %self.path.display(), "Config watcher started");

        let stats = self.drive(event_rx, stop).await;

        drop(watcher);
        tracing::debug!(
            reloads = stats.reloads,
            failures = stats.failures,
            dropped = stats.dropped,
            "Stopped user config file watcher"
        );
        Ok(stats)
    }

    /// Consume write events until stopped.
    pub async fn drive(
        mut self,
        mut events: mpsc::UnboundedReceiver<()>,
        mut stop: oneshot::Receiver<()>,
    ) -> WatcherStats {
        loop {
            tokio::select! {
                _ = &mut stop => break,
                event = events.recv() => match event {
                    Some(()) => self.on_write().await,
                    None => {
                        // Sender gone: nothing more will arrive, just wait for stop.
                        let _ = (&mut stop).await;
                        break;
                    }
                },
            }
        }
        self.stats
    }

    async fn on_write(&mut self) {
        let now = Instant::now();
        if !self.debouncer.is_ready(now) {
            self.stats.dropped += 1;
            tracing::trace!("Config write inside cooldown window, ignoring");
            return;
        }

        tracing::debug!(path = %self.path.display(), "Config file modified, attempting reload");
        tokio::time::sleep(self.settle_delay).await;

        match self.store.load() {
            Ok(outcome) => {
                self.debouncer.record_success(now);
                self.stats.reloads += 1;
                tracing::info!(generation = outcome.generation, "Reloaded config successfully");
                self.store
                    .notifier()
                    .notify("Configuration reloaded!", "Your changes have been applied.");
                self.store.announce_reload(&outcome);
            }
            Err(e) => {
                // The store already notified the user.
                self.stats.failures += 1;
                tracing::warn!(error = %e, "Failed to reload config file");
            }
        }
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_write_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::{SourceLocator, USER_CONFIG_FILE};
    use crate::notification::NotificationSink;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind};
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl NotificationSink for Recorder {
        fn notify(&self, title: &str, _message: &str) {
            self.0.lock().unwrap().push(title.to_string());
        }
    }

    struct Fixture {
        _dir: TempDir,
        path: PathBuf,
        store: Arc<ConfigStore>,
        recorder: Arc<Recorder>,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(USER_CONFIG_FILE);
        fs::write(&path, "udp_port = 1000").unwrap();

        let recorder = Arc::new(Recorder::default());
        let store = Arc::new(ConfigStore::new(
            SourceLocator::new(vec![dir.path().to_path_buf()], None),
            recorder.clone(),
        ));
        store.override_source_location(&path);
        store.load().unwrap();

        Fixture {
            _dir: dir,
            path,
            store,
            recorder,
        }
    }

    #[test]
    fn test_debouncer_window() {
        let start = Instant::now();
        let mut debouncer = Debouncer::new(start, RELOAD_COOLDOWN);

        assert!(!debouncer.is_ready(start + Duration::from_millis(499)));
        assert!(debouncer.is_ready(start + Duration::from_millis(500)));

        debouncer.record_success(start + Duration::from_millis(600));
        assert!(!debouncer.is_ready(start + Duration::from_millis(900)));
        assert!(debouncer.is_ready(start + Duration::from_millis(1100)));
    }

    #[test]
    fn test_write_event_filter() {
        assert!(is_write_event(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_write_event(&EventKind::Create(CreateKind::File)));
        assert!(!is_write_event(&EventKind::Access(AccessKind::Any)));
        assert!(!is_write_event(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any))));
    }

    #[test]
    fn test_watch_dir_for_bare_file_name() {
        assert_eq!(watch_dir(Path::new("config.toml")), PathBuf::from("."));
        assert_eq!(watch_dir(Path::new("/etc/mix/config.toml")), PathBuf::from("/etc/mix"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_reload() {
        let fx = fixture();
        let mut sub = fx.store.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(ConfigWatcher::new(fx.store.clone(), &fx.path).drive(rx, stop_rx));

        tokio::time::sleep(Duration::from_millis(600)).await;
        fs::write(&fx.path, "udp_port = 2000").unwrap();
        for _ in 0..3 {
            tx.send(()).unwrap();
        }

        let notice = sub.recv().await.unwrap();
        assert_eq!(notice.config.udp.port, 2000);

        // Let the rest of the burst drain.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sub.try_recv().is_none());

        // Past the cooldown, a single write reloads again.
        tokio::time::sleep(Duration::from_millis(500)).await;
        fs::write(&fx.path, "udp_port = 3000").unwrap();
        tx.send(()).unwrap();
        assert_eq!(sub.recv().await.unwrap().config.udp.port, 3000);

        stop_tx.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.reloads, 2);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.failures, 0);
        assert_eq!(
            *fx.recorder.0.lock().unwrap(),
            vec!["Configuration reloaded!", "Configuration reloaded!"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_waits_for_settle_delay() {
        let fx = fixture();
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(ConfigWatcher::new(fx.store.clone(), &fx.path).drive(rx, stop_rx));

        tokio::time::sleep(Duration::from_millis(600)).await;
        tx.send(()).unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fx.store.generation(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.store.generation(), 2);

        stop_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_inside_startup_window_is_dropped() {
        let fx = fixture();
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(ConfigWatcher::new(fx.store.clone(), &fx.path).drive(rx, stop_rx));

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        stop_tx.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.reloads, 0);
        assert_eq!(stats.dropped, 1);
        assert_eq!(fx.store.generation(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reload_does_not_reset_cooldown() {
        let fx = fixture();
        let mut sub = fx.store.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(ConfigWatcher::new(fx.store.clone(), &fx.path).drive(rx, stop_rx));

        tokio::time::sleep(Duration::from_millis(600)).await;
        fs::write(&fx.path, "udp_port = [").unwrap();
        tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(sub.try_recv().is_none());

        // Fixed shortly after the broken save: still eligible.
        fs::write(&fx.path, "udp_port = 4000").unwrap();
        tx.send(()).unwrap();
        assert_eq!(sub.recv().await.unwrap().config.udp.port, 4000);

        stop_tx.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.reloads, 1);
        assert_eq!(
            *fx.recorder.0.lock().unwrap(),
            vec!["Invalid configuration!", "Configuration reloaded!"]
        );
    }
}
