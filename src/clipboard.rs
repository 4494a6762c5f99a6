//! Clipboard watcher.
//!
//! Polls the system clipboard on a short interval and reports each new
//! piece of text once, after collapsing runs of whitespace.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::settings::SettingsStore;

/// Back-off while monitoring is switched off in settings.
const DISABLED_BACKOFF: Duration = Duration::from_millis(100);

/// Collapse every run of whitespace (newlines and tabs included) to a single
/// space and trim the ends.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Source of clipboard text.
pub trait ClipboardSource: Send {
    /// Current text content, or `None` if the clipboard holds no text.
    fn read_text(&mut self) -> Option<String>;
}

pub struct SystemClipboard {
    inner: arboard::Clipboard,
}

impl SystemClipboard {
    pub fn open() -> Result<Self, arboard::Error> {
        Ok(Self {
            inner: arboard::Clipboard::new()?,
        })
    }
}

impl ClipboardSource for SystemClipboard {
    fn read_text(&mut self) -> Option<String> {
        self.inner.get_text().ok()
    }
}

/// Remembers the last normalized text seen and reports changes.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    last_seen: String,
}

impl ChangeTracker {
    /// Returns the normalized text if it is non-empty and differs from the
    /// last text reported.
    pub fn observe(&mut self, raw: &str) -> Option<String> {
        let cleaned = normalize_text(raw);
        if cleaned.is_empty() || cleaned == self.last_seen {
            return None;
        }
        self.last_seen = cleaned.clone();
        Some(cleaned)
    }
}

pub struct ClipboardWatcher {
    poll_interval: Duration,
    settings: Arc<SettingsStore>,
    shutdown: CancellationToken,
}

impl ClipboardWatcher {
    pub fn new(
        poll_interval: Duration,
        settings: Arc<SettingsStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            poll_interval,
            settings,
            shutdown,
        }
    }

    /// Start polling on a blocking worker. `on_change` runs on that worker
    /// for every new piece of text.
    pub fn spawn<S, F>(self, runtime: &Handle, open_source: S, on_change: F) -> JoinHandle<()>
    where
        S: FnOnce() -> Option<Box<dyn ClipboardSource>> + Send + 'static,
        F: Fn(String) + Send + 'static,
    {
        runtime.spawn_blocking(move || {
            let Some(mut source) = open_source() else {
                warn!("Clipboard unavailable, monitoring disabled");
                return;
            };
            info!("Clipboard monitor started ({}ms interval)", self.poll_interval.as_millis());
            self.run(source.as_mut(), on_change);
            info!("Clipboard monitor stopped");
        })
    }

    fn run(&self, source: &mut dyn ClipboardSource, on_change: impl Fn(String)) {
        // Starts empty, so text already on the clipboard is reported too.
        let mut tracker = ChangeTracker::default();

        while !self.shutdown.is_cancelled() {
            if !self.settings.get().clipboard_monitoring {
                std::thread::sleep(DISABLED_BACKOFF);
                continue;
            }

            if let Some(text) = source.read_text() {
                if let Some(changed) = tracker.observe(&text) {
                    debug!("Clipboard changed: {changed:?}");
                    on_change(changed);
                }
            }

            std::thread::sleep(self.poll_interval);
        }
    }
}
