//! Speech engine pool.
//!
//! Initializing a speech driver is slow and some drivers misbehave when
//! several instances are created and torn down in quick succession, so the
//! pool keeps one engine around and hands it out again while it is idle.
//!
//! Every operation runs under a single lock. The lock is never held while
//! an utterance plays: callers speak through the returned [`EngineHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{select_voice, EngineError, SpeechDriver, Synthesizer, VoiceProfile};

const SPEAK_POLL: Duration = Duration::from_millis(50);

type SharedSynth = Arc<Mutex<Box<dyn Synthesizer>>>;

fn lock_synth(synth: &SharedSynth) -> MutexGuard<'_, Box<dyn Synthesizer>> {
    synth.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A synthesizer handed out by [`EnginePool::acquire`].
///
/// `lease` identifies this particular acquire: releasing a handle whose
/// lease is no longer current is a no-op.
#[derive(Clone)]
pub struct EngineHandle {
    engine_id: u64,
    lease: u64,
    synth: SharedSynth,
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine_id", &self.engine_id)
            .field("lease", &self.lease)
            .finish()
    }
}

impl EngineHandle {
    #[cfg(test)]
    pub fn engine_id(&self) -> u64 {
        self.engine_id
    }

    /// Begin speaking `text` unless `cancel` is already set. Returns whether
    /// the utterance was started.
    pub fn start(&self, text: &str, cancel: &AtomicBool) -> Result<bool, EngineError> {
        let mut synth = lock_synth(&self.synth);
        if cancel.load(Ordering::Relaxed) {
            return Ok(false);
        }
        synth.speak(text)?;
        Ok(true)
    }

    /// Block until the current utterance ends or `cancel` is set.
    /// Returns `Ok(false)` if cancelled. Stopping the audio is left to
    /// whoever set the flag.
    pub fn wait(&self, cancel: &AtomicBool) -> Result<bool, EngineError> {
        loop {
            thread::sleep(SPEAK_POLL);
            if cancel.load(Ordering::Relaxed) {
                return Ok(false);
            }
            if !lock_synth(&self.synth).is_speaking()? {
                return Ok(true);
            }
        }
    }

    pub fn stop(&self) {
        if let Err(e) = lock_synth(&self.synth).stop() {
            warn!("Failed to stop speech: {e}");
        }
    }
}

struct Pooled {
    engine_id: u64,
    synth: SharedSynth,
    busy: bool,
    lease: u64,
}

struct PoolInner {
    pooled: Option<Pooled>,
    /// Every engine still alive, including superseded busy ones.
    tracked: Vec<(u64, SharedSynth)>,
    next_engine_id: u64,
    next_lease: u64,
}

impl PoolInner {
    fn take_lease(&mut self) -> u64 {
        self.next_lease += 1;
        self.next_lease
    }

    fn discard(&mut self, engine_id: u64) {
        if let Some(pos) = self.tracked.iter().position(|(id, _)| *id == engine_id) {
            let (_, synth) = self.tracked.swap_remove(pos);
            let _ = lock_synth(&synth).stop();
        }
        if self.pooled.as_ref().is_some_and(|p| p.engine_id == engine_id) {
            self.pooled = None;
        }
    }
}

pub struct EnginePool {
    driver: Box<dyn SpeechDriver>,
    inner: Mutex<PoolInner>,
}

impl EnginePool {
    pub fn new(driver: Box<dyn SpeechDriver>) -> Self {
        Self {
            driver,
            inner: Mutex::new(PoolInner {
                pooled: None,
                tracked: Vec::new(),
                next_engine_id: 0,
                next_lease: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out an engine configured with `profile`.
    ///
    /// Reuses the pooled engine when it is idle. If it is busy, a fresh
    /// engine is created and becomes the pooled one; the caller is expected
    /// to serialize requests, so this does not wait.
    pub fn acquire(&self, profile: &VoiceProfile) -> Result<EngineHandle, EngineError> {
        let mut inner = self.lock();

        let idle = match &inner.pooled {
            Some(p) if !p.busy => Some((p.engine_id, p.synth.clone())),
            _ => None,
        };

        if let Some((engine_id, synth)) = idle {
            let configured = configure(lock_synth(&synth).as_mut(), profile);
            match configured {
                Ok(()) => {
                    let lease = inner.take_lease();
                    if let Some(pooled) = inner.pooled.as_mut() {
                        pooled.busy = true;
                        pooled.lease = lease;
                    }
                    debug!("Reusing speech engine #{engine_id} (lease {lease})");
                    return Ok(EngineHandle {
                        engine_id,
                        lease,
                        synth,
                    });
                }
                Err(e) => {
                    warn!("Speech engine #{engine_id} failed, creating a new one: {e}");
                    inner.discard(engine_id);
                }
            }
        }

        let mut synth = self.driver.init().map_err(|e| match e {
            EngineError::Driver(msg) => EngineError::Unavailable(msg),
            other => other,
        })?;
        configure(synth.as_mut(), profile).map_err(|e| EngineError::Unavailable(e.to_string()))?;

        inner.next_engine_id += 1;
        let engine_id = inner.next_engine_id;
        let lease = inner.take_lease();
        let synth: SharedSynth = Arc::new(Mutex::new(synth));

        inner.tracked.push((engine_id, synth.clone()));
        inner.pooled = Some(Pooled {
            engine_id,
            synth: synth.clone(),
            busy: true,
            lease,
        });
        info!("Created speech engine #{engine_id}");

        Ok(EngineHandle {
            engine_id,
            lease,
            synth,
        })
    }

    /// Return an engine to the pool. Safe to call more than once per handle.
    pub fn release(&self, handle: &EngineHandle) {
        let mut inner = self.lock();
        match inner.pooled.as_mut() {
            Some(pooled) if pooled.engine_id == handle.engine_id => {
                if pooled.lease == handle.lease {
                    pooled.busy = false;
                    debug!("Released speech engine #{} (lease {})", handle.engine_id, handle.lease);
                } else {
                    debug!("Ignoring stale release of lease {}", handle.lease);
                }
            }
            _ => {
                // Superseded while busy; nothing will hand it out again.
                inner.tracked.retain(|(id, _)| *id != handle.engine_id);
            }
        }
    }

    /// Apply new properties to the idle pooled engine, if any.
    pub fn apply_profile(&self, profile: &VoiceProfile) {
        let mut inner = self.lock();
        let idle = match &inner.pooled {
            Some(p) if !p.busy => Some((p.engine_id, p.synth.clone())),
            _ => None,
        };
        let Some((engine_id, synth)) = idle else {
            return;
        };
        let configured = configure(lock_synth(&synth).as_mut(), profile);
        if let Err(e) = configured {
            warn!("Speech engine #{engine_id} rejected new settings, dropping it: {e}");
            inner.discard(engine_id);
        }
    }

    /// Names of the installed voices.
    pub fn voices(&self) -> Result<Vec<String>, EngineError> {
        let inner = self.lock();
        let voices = match &inner.pooled {
            Some(p) if !p.busy => lock_synth(&p.synth).voices()?,
            _ => {
                let mut temp = self.driver.init()?;
                let voices = temp.voices();
                let _ = temp.stop();
                voices?
            }
        };
        Ok(voices.into_iter().map(|v| v.name).collect())
    }

    #[cfg(test)]
    pub fn has_idle_engine(&self) -> bool {
        self.lock().pooled.as_ref().is_some_and(|p| !p.busy)
    }

    /// Stop every engine and forget them.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        for (engine_id, synth) in inner.tracked.drain(..) {
            if let Err(e) = lock_synth(&synth).stop() {
                warn!("Error stopping speech engine #{engine_id}: {e}");
            }
        }
        inner.pooled = None;
        info!("Speech engines shut down");
    }
}

fn configure(synth: &mut dyn Synthesizer, profile: &VoiceProfile) -> Result<(), EngineError> {
    synth.set_rate(profile.rate)?;
    synth.set_volume(profile.volume)?;

    // Voice choice is best effort; a driver without voice listing still speaks.
    match synth.voices() {
        Ok(voices) => {
            if let Some(voice) = select_voice(&voices, &profile.voice_name) {
                if let Err(e) = synth.set_voice(voice) {
                    warn!("Failed to select voice {}: {e}", voice.name);
                }
            }
        }
        Err(e) => debug!("Voice listing unavailable: {e}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::fake::FakeDriver;

    fn profile() -> VoiceProfile {
        VoiceProfile {
            rate: 150,
            volume: 1.0,
            voice_name: "zira".into(),
        }
    }

    #[test]
    fn sequential_acquires_reuse_engine() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));

        let first = pool.acquire(&profile()).unwrap();
        pool.release(&first);
        let second = pool.acquire(&profile()).unwrap();
        pool.release(&second);

        assert_eq!(first.engine_id(), second.engine_id());
        assert_eq!(driver.init_count(), 1);
        assert!(pool.has_idle_engine());
    }

    #[test]
    fn acquire_while_busy_creates_independent_engine() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));

        let first = pool.acquire(&profile()).unwrap();
        let second = pool.acquire(&profile()).unwrap();

        assert_ne!(first.engine_id(), second.engine_id());
        assert_eq!(driver.init_count(), 2);

        // The superseded engine going back doesn't free the pooled one.
        pool.release(&first);
        assert!(!pool.has_idle_engine());
        pool.release(&second);
        assert!(pool.has_idle_engine());

        let third = pool.acquire(&profile()).unwrap();
        assert_eq!(third.engine_id(), second.engine_id());
    }

    #[test]
    fn stale_release_does_not_free_engine() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));

        let old = pool.acquire(&profile()).unwrap();
        pool.release(&old);
        let current = pool.acquire(&profile()).unwrap();
        assert_eq!(old.engine_id(), current.engine_id());

        pool.release(&old);
        assert!(!pool.has_idle_engine());

        pool.release(&current);
        assert!(pool.has_idle_engine());
    }

    #[test]
    fn broken_idle_engine_replaced() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));

        let first = pool.acquire(&profile()).unwrap();
        pool.release(&first);

        driver.break_engine(first.engine_id());
        let second = pool.acquire(&profile()).unwrap();

        assert_ne!(first.engine_id(), second.engine_id());
        assert_eq!(driver.init_count(), 2);
        assert!(driver.stop_count(first.engine_id()) >= 1);
    }

    #[test]
    fn driver_init_failure_is_unavailable() {
        let driver = FakeDriver::new();
        driver.fail_init(true);
        let pool = EnginePool::new(Box::new(driver.clone()));

        let err = pool.acquire(&profile()).unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));

        // Recovers on the next request once the driver is back.
        driver.fail_init(false);
        assert!(pool.acquire(&profile()).is_ok());
    }

    #[test]
    fn acquire_applies_profile() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));

        let custom = VoiceProfile {
            rate: 220,
            volume: 0.4,
            voice_name: "david".into(),
        };
        let handle = pool.acquire(&custom).unwrap();
        let props = driver.properties(handle.engine_id());
        assert_eq!(props.rate, 220);
        assert!((props.volume - 0.4).abs() < f32::EPSILON);
        assert_eq!(props.voice.as_deref(), Some("Fake David"));
    }

    #[test]
    fn apply_profile_updates_idle_engine() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));

        let handle = pool.acquire(&profile()).unwrap();
        pool.release(&handle);

        pool.apply_profile(&VoiceProfile {
            rate: 90,
            ..profile()
        });
        assert_eq!(driver.properties(handle.engine_id()).rate, 90);
    }

    #[test]
    fn voices_listed_without_pooled_engine() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));

        let voices = pool.voices().unwrap();
        assert_eq!(voices, vec!["Fake Zira", "Fake David"]);
        assert!(!pool.has_idle_engine());
    }

    #[test]
    fn shutdown_stops_all_engines() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));

        let first = pool.acquire(&profile()).unwrap();
        let second = pool.acquire(&profile()).unwrap();
        pool.shutdown();

        assert_eq!(driver.stop_count(first.engine_id()), 1);
        assert_eq!(driver.stop_count(second.engine_id()), 1);
        assert!(!pool.has_idle_engine());
    }

    #[test]
    fn cancelled_handle_does_not_start() {
        let driver = FakeDriver::new();
        let pool = EnginePool::new(Box::new(driver.clone()));
        let handle = pool.acquire(&profile()).unwrap();

        let cancel = AtomicBool::new(true);
        assert!(!handle.start("hello", &cancel).unwrap());
        assert!(driver.spoken().is_empty());

        let cancel = AtomicBool::new(false);
        assert!(handle.start("hello", &cancel).unwrap());
        assert_eq!(driver.spoken(), vec!["hello"]);
        assert!(handle.wait(&cancel).unwrap());
    }

    #[test]
    fn wait_returns_once_cancelled() {
        let driver = FakeDriver::holding();
        let pool = EnginePool::new(Box::new(driver.clone()));
        let handle = pool.acquire(&profile()).unwrap();

        let cancel = AtomicBool::new(false);
        assert!(handle.start("long", &cancel).unwrap());
        cancel.store(true, Ordering::Relaxed);
        assert!(!handle.wait(&cancel).unwrap());
    }
}
