//! Messages from background tasks to the UI thread.
//!
//! Workers never touch UI state directly. They post a [`UiEvent`] and poke
//! the UI so it drains the queue on its next frame.

use std::sync::{Arc, OnceLock};

use tokio::sync::mpsc;

use crate::update::UpdateInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// A speech request got an engine and started talking.
    SpeechStarted { request: u64, text: String },
    SpeechFinished { request: u64 },
    SpeechFailed { request: u64, error: String },
    /// New normalized clipboard text.
    ClipboardText(String),
    UpdateAvailable(UpdateInfo),
    /// Result of a user-initiated update check: `Ok(None)` means up to date.
    UpdateCheckDone(Result<Option<UpdateInfo>, String>),
}

type Waker = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<UiEvent>,
    waker: Arc<OnceLock<Waker>>,
}

impl EventSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                waker: Arc::new(OnceLock::new()),
            },
            rx,
        )
    }

    /// Install the callback that wakes the UI thread (e.g. a repaint
    /// request). Only the first call takes effect.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        let _ = self.waker.set(Arc::new(waker));
    }

    pub fn send(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("UI event dropped, receiver closed");
            return;
        }
        if let Some(wake) = self.waker.get() {
            wake();
        }
    }
}
