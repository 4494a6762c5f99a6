//! Speech request dispatcher with state machine.
//!
//! IDLE → SPEAKING → IDLE (or → ERROR → IDLE once the failure is posted)
//!
//! Each request runs on a blocking worker. A newer request or a stop
//! disowns the running one: its cancel flag is set, its engine is stopped
//! and released, and when the worker finishes it checks the flag and
//! leaves shared state alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::pool::{EngineHandle, EnginePool};
use super::{EngineError, VoiceProfile};
use crate::events::{EventSender, UiEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Speaking,
    Error,
}

impl std::fmt::Display for DispatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Speaking => write!(f, "SPEAKING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

struct ActiveRequest {
    id: u64,
    cancel: Arc<AtomicBool>,
    handle: Option<EngineHandle>,
}

struct Shared {
    state: DispatchState,
    active: Option<ActiveRequest>,
    next_id: u64,
}

pub struct SpeechDispatcher {
    pool: Arc<EnginePool>,
    runtime: Handle,
    events: EventSender,
    shared: Arc<Mutex<Shared>>,
}

fn lock_shared(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SpeechDispatcher {
    pub fn new(pool: Arc<EnginePool>, runtime: Handle, events: EventSender) -> Self {
        Self {
            pool,
            runtime,
            events,
            shared: Arc::new(Mutex::new(Shared {
                state: DispatchState::Idle,
                active: None,
                next_id: 0,
            })),
        }
    }

    pub fn state(&self) -> DispatchState {
        lock_shared(&self.shared).state
    }

    pub fn pool(&self) -> &Arc<EnginePool> {
        &self.pool
    }

    /// Queue `text` for speaking, superseding any request in flight.
    /// Returns the request id, or `None` for blank text.
    pub fn speak(&self, text: &str, profile: VoiceProfile) -> Option<u64> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let (id, cancel) = {
            let mut shared = lock_shared(&self.shared);
            self.disown_active(&mut shared);
            shared.next_id += 1;
            let id = shared.next_id;
            let cancel = Arc::new(AtomicBool::new(false));
            shared.active = Some(ActiveRequest {
                id,
                cancel: cancel.clone(),
                handle: None,
            });
            info!("State: {} → SPEAKING (request {id})", shared.state);
            shared.state = DispatchState::Speaking;
            (id, cancel)
        };

        let task = SpeakTask {
            id,
            text: text.to_string(),
            profile,
            cancel,
            pool: self.pool.clone(),
            shared: self.shared.clone(),
            events: self.events.clone(),
        };
        self.runtime.spawn_blocking(move || task.run());

        Some(id)
    }

    /// Stop the active request, if any. Returns whether one was running.
    pub fn stop(&self) -> bool {
        let mut shared = lock_shared(&self.shared);
        let stopped = self.disown_active(&mut shared);
        if shared.state != DispatchState::Idle {
            info!("State: {} → IDLE", shared.state);
        }
        shared.state = DispatchState::Idle;
        stopped
    }

    fn disown_active(&self, shared: &mut Shared) -> bool {
        let Some(active) = shared.active.take() else {
            return false;
        };
        active.cancel.store(true, Ordering::Relaxed);
        if let Some(handle) = &active.handle {
            handle.stop();
            self.pool.release(handle);
        }
        debug!("Disowned speech request {}", active.id);
        true
    }
}

struct SpeakTask {
    id: u64,
    text: String,
    profile: VoiceProfile,
    cancel: Arc<AtomicBool>,
    pool: Arc<EnginePool>,
    shared: Arc<Mutex<Shared>>,
    events: EventSender,
}

impl SpeakTask {
    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn run(self) {
        if self.is_cancelled() {
            return;
        }

        let handle = match self.pool.acquire(&self.profile) {
            Ok(handle) => handle,
            Err(e) => {
                self.finish(Err(e));
                return;
            }
        };

        {
            let mut shared = lock_shared(&self.shared);
            match shared.active.as_mut() {
                Some(active) if active.id == self.id && !self.is_cancelled() => {
                    active.handle = Some(handle.clone());
                }
                _ => {
                    drop(shared);
                    self.pool.release(&handle);
                    return;
                }
            }
        }

        match handle.start(&self.text, &self.cancel) {
            Ok(true) => {}
            Ok(false) => {
                self.pool.release(&handle);
                return;
            }
            Err(e) => {
                self.pool.release(&handle);
                self.finish(Err(e));
                return;
            }
        }

        // Only reported once the driver has the utterance.
        self.events.send(UiEvent::SpeechStarted {
            request: self.id,
            text: self.text.clone(),
        });

        let result = handle.wait(&self.cancel);
        self.pool.release(&handle);
        self.finish(result.map(|_| ()));
    }

    fn finish(&self, result: Result<(), EngineError>) {
        let mut shared = lock_shared(&self.shared);
        let still_active = shared.active.as_ref().is_some_and(|a| a.id == self.id);
        if self.is_cancelled() || !still_active {
            debug!("Speech request {} finished after being disowned", self.id);
            return;
        }
        shared.active = None;

        match result {
            Ok(()) => {
                info!("State: SPEAKING → IDLE (request {})", self.id);
                shared.state = DispatchState::Idle;
                drop(shared);
                self.events.send(UiEvent::SpeechFinished { request: self.id });
            }
            Err(e) => {
                warn!("Speech request {} failed: {e}", self.id);
                info!("State: SPEAKING → ERROR (request {})", self.id);
                shared.state = DispatchState::Error;
                drop(shared);
                self.events.send(UiEvent::SpeechFailed {
                    request: self.id,
                    error: e.to_string(),
                });

                // The failure has been reported; a newer request may
                // already have moved the state on.
                let mut shared = lock_shared(&self.shared);
                if shared.state == DispatchState::Error && shared.active.is_none() {
                    info!("State: ERROR → IDLE");
                    shared.state = DispatchState::Idle;
                }
            }
        }
    }
}
