//! Application context: owns the settings, speech engines and history that
//! the UI and background tasks share.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clipboard::{ClipboardSource, ClipboardWatcher, SystemClipboard};
use crate::config::Config;
use crate::events::{EventSender, UiEvent};
use crate::history::HistoryList;
use crate::notifier::Notifier;
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::speech::system::SystemSpeechDriver;
use crate::speech::{DispatchState, EnginePool, SpeechDispatcher, SpeechDriver};
use crate::update::{GithubReleases, UpdateChecker, UpdateInfo, CURRENT_VERSION};

/// What happened to a speak request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Blank text.
    Ignored,
    /// TTS is switched off in settings.
    Disabled,
    Started(u64),
}

pub struct AppContext {
    config: Config,
    settings: Arc<SettingsStore>,
    dispatcher: SpeechDispatcher,
    history: Mutex<HistoryList>,
    events: EventSender,
    /// `None` when no HTTP client could be built.
    updates: Option<Arc<UpdateChecker>>,
    notifier: Notifier,
    shutdown: CancellationToken,
    runtime: Handle,
}

impl AppContext {
    /// Build the context on the platform speech driver. The returned
    /// receiver carries every [`UiEvent`] for the UI thread.
    pub fn start(config: Config, runtime: Handle) -> (Self, UnboundedReceiver<UiEvent>) {
        Self::with_driver(config, runtime, Box::new(SystemSpeechDriver))
    }

    pub fn with_driver(
        config: Config,
        runtime: Handle,
        driver: Box<dyn SpeechDriver>,
    ) -> (Self, UnboundedReceiver<UiEvent>) {
        let settings = Arc::new(SettingsStore::load(config.settings_path()));
        let (events, rx) = EventSender::channel();
        let pool = Arc::new(EnginePool::new(driver));
        let dispatcher = SpeechDispatcher::new(pool, runtime.clone(), events.clone());

        let updates = match GithubReleases::new(
            &config.update.feed_url,
            Duration::from_secs(config.update.timeout_secs),
        ) {
            Ok(feed) => Some(Arc::new(UpdateChecker::new(
                feed,
                CURRENT_VERSION,
                config.update_stamp_path(),
            ))),
            Err(e) => {
                warn!("{e}, update checks disabled");
                None
            }
        };

        let ctx = Self {
            history: Mutex::new(HistoryList::new(config.history.max_entries)),
            notifier: Notifier::new(config.update.notify),
            config,
            settings,
            dispatcher,
            events,
            updates,
            shutdown: CancellationToken::new(),
            runtime,
        };
        (ctx, rx)
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn settings(&self) -> Settings {
        self.settings.get()
    }

    pub fn speech_state(&self) -> DispatchState {
        self.dispatcher.state()
    }

    fn lock_history(&self) -> MutexGuard<'_, HistoryList> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Newest first.
    pub fn history(&self) -> Vec<String> {
        self.lock_history().to_vec()
    }

    pub fn clear_history(&self) {
        self.lock_history().clear();
    }

    /// Speak `text` with the current settings, superseding anything already
    /// being spoken.
    pub fn speak(&self, text: &str) -> SpeakOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SpeakOutcome::Ignored;
        }

        let settings = self.settings.get();
        if !settings.tts_enabled {
            debug!("TTS disabled, not speaking {text:?}");
            return SpeakOutcome::Disabled;
        }

        self.lock_history().record(text);

        match self.dispatcher.speak(text, settings.voice_profile()) {
            Some(id) => SpeakOutcome::Started(id),
            None => SpeakOutcome::Ignored,
        }
    }

    pub fn stop(&self) -> bool {
        self.dispatcher.stop()
    }

    /// Persist new settings and push the voice properties to the idle engine.
    pub fn save_settings(&self, settings: Settings) -> Result<(), SettingsError> {
        let profile = settings.voice_profile();
        let saved = self.settings.save(settings);
        self.dispatcher.pool().apply_profile(&profile);
        saved
    }

    pub fn reset_settings(&self) -> Result<(), SettingsError> {
        self.save_settings(Settings::default())
    }

    /// Installed voice names, empty if the speech backend is unavailable.
    pub fn voices(&self) -> Vec<String> {
        self.dispatcher.pool().voices().unwrap_or_else(|e| {
            warn!("Could not list voices: {e}");
            Vec::new()
        })
    }

    /// Poll the system clipboard and post each change as
    /// [`UiEvent::ClipboardText`].
    pub fn start_clipboard_watcher(&self) -> JoinHandle<()> {
        let watcher = ClipboardWatcher::new(
            Duration::from_millis(self.config.clipboard.poll_interval_ms),
            self.settings.clone(),
            self.shutdown.clone(),
        );
        let events = self.events.clone();

        watcher.spawn(
            &self.runtime,
            || match SystemClipboard::open() {
                Ok(clipboard) => Some(Box::new(clipboard) as Box<dyn ClipboardSource>),
                Err(e) => {
                    warn!("Failed to open clipboard: {e}");
                    None
                }
            },
            move |text| events.send(UiEvent::ClipboardText(text)),
        )
    }

    /// Throttled background check. Posts [`UiEvent::UpdateAvailable`] when a
    /// newer release exists.
    pub fn spawn_update_check(&self) -> Option<JoinHandle<()>> {
        if !self.config.update.enabled {
            debug!("Update checks disabled");
            return None;
        }

        let updates = self.updates.clone()?;
        let events = self.events.clone();
        let shutdown = self.shutdown.clone();

        Some(self.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                found = updates.check() => {
                    if let Some(info) = found {
                        events.send(UiEvent::UpdateAvailable(info));
                    }
                }
            }
        }))
    }

    /// Desktop notification for a newer release. Skipped while the window
    /// has focus, since the update dialog is already in front of the user.
    /// Returns whether a notification was requested.
    pub fn announce_update(&self, info: &UpdateInfo, window_focused: bool) -> bool {
        if window_focused {
            debug!("Window focused, no notification for {}", info.version);
            return false;
        }
        self.notifier.update_available(info, self.current_version());
        true
    }

    /// Unthrottled check for the "Check for Updates" dialog. The outcome
    /// arrives as [`UiEvent::UpdateCheckDone`].
    pub fn check_updates_now(&self) -> Option<JoinHandle<()>> {
        let events = self.events.clone();
        let Some(updates) = self.updates.clone() else {
            events.send(UiEvent::UpdateCheckDone(Err("update checks are unavailable".into())));
            return None;
        };
        let shutdown = self.shutdown.clone();

        Some(self.runtime.spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = updates.check_now() => {
                    events.send(UiEvent::UpdateCheckDone(result.map_err(|e| e.to_string())));
                }
            }
        }))
    }

    pub fn current_version(&self) -> &str {
        self.updates
            .as_deref()
            .map_or(CURRENT_VERSION, |u| u.current_version())
    }

    pub fn last_update_check(&self) -> Option<DateTime<Local>> {
        self.updates.as_ref()?.last_checked()
    }

    /// Stop background work and tear down the speech engines.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        info!("Shutting down");
        self.shutdown.cancel();
        self.dispatcher.stop();
        self.dispatcher.pool().shutdown();
    }
}
