//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mixbridge::config::{ConfigStore, SourceLocator};
use mixbridge::lifecycle::TrayIntegration;
use mixbridge::notification::NotificationSink;
use mixbridge::targets::{ReleaseError, SinkError, VolumeSink};

/// Keeps every notification so tests can assert on titles and messages.
#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<(String, String)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn titles(&self) -> Vec<String> {
        self.all().into_iter().map(|(title, _)| title).collect()
    }

    pub fn count_titled(&self, title: &str) -> usize {
        self.titles().iter().filter(|t| t.as_str() == title).count()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.seen
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}

/// Records volume changes; optionally fails on release.
#[derive(Default)]
pub struct RecordingSink {
    levels: Mutex<Vec<(String, f32)>>,
    releases: AtomicUsize,
    fail_release: bool,
}

impl RecordingSink {
    pub fn failing_release() -> Self {
        Self {
            fail_release: true,
            ..Self::default()
        }
    }

    pub fn levels(&self) -> Vec<(String, f32)> {
        self.levels.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl VolumeSink for RecordingSink {
    fn set_volume(&self, target: &str, level: f32) -> Result<(), SinkError> {
        self.levels.lock().unwrap().push((target.to_string(), level));
        Ok(())
    }

    fn release(&self) -> Result<(), ReleaseError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release {
            return Err(ReleaseError {
                resource: "audio session".to_string(),
                reason: "device vanished".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingTray {
    stops: AtomicUsize,
}

impl CountingTray {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl TrayIntegration for CountingTray {
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn write_config(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

/// A UDP controller config listening on `port`.
pub fn udp_config(port: u16, mapping: &str) -> String {
    format!(
        "controller_type = \"udp\"\nudp_port = {}\nnoise_reduction = \"default\"\n\n[slider_mapping]\n{}\n",
        port, mapping
    )
}

/// Store that only searches `dir` and has no internal document.
pub fn store_in(dir: &Path, notifier: Arc<RecordingNotifier>) -> Arc<ConfigStore> {
    let locator = SourceLocator::new(vec![dir.to_path_buf()], None);
    Arc::new(ConfigStore::new(locator, notifier))
}

pub fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
    socket.local_addr().unwrap().port()
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
