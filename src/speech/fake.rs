//! In-memory speech driver for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{EngineError, SpeechDriver, Synthesizer, VoiceInfo};

#[derive(Debug, Clone, Default)]
pub struct FakeProperties {
    pub rate: u32,
    pub volume: f32,
    pub voice: Option<String>,
    pub speaking: bool,
    pub broken: bool,
    pub stops: u32,
}

#[derive(Default)]
struct FakeState {
    inits: u32,
    fail_init: bool,
    /// Utterances keep playing until stopped.
    hold_speech: bool,
    engines: HashMap<u64, FakeProperties>,
    spoken: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engines created by a holding driver report `is_speaking` until stopped.
    pub fn holding() -> Self {
        let driver = Self::new();
        driver.state.lock().unwrap().hold_speech = true;
        driver
    }

    pub fn init_count(&self) -> u32 {
        self.state.lock().unwrap().inits
    }

    pub fn fail_init(&self, fail: bool) {
        self.state.lock().unwrap().fail_init = fail;
    }

    pub fn break_engine(&self, engine_id: u64) {
        if let Some(props) = self.state.lock().unwrap().engines.get_mut(&engine_id) {
            props.broken = true;
        }
    }

    pub fn properties(&self, engine_id: u64) -> FakeProperties {
        self.state
            .lock()
            .unwrap()
            .engines
            .get(&engine_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stop_count(&self, engine_id: u64) -> u32 {
        self.properties(engine_id).stops
    }

    pub fn spoken(&self) -> Vec<String> {
        self.state.lock().unwrap().spoken.clone()
    }
}

impl SpeechDriver for FakeDriver {
    fn init(&self) -> Result<Box<dyn Synthesizer>, EngineError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_init {
            return Err(EngineError::Unavailable("no speech backend".into()));
        }
        state.inits += 1;
        // Matches the pool's numbering, which starts at 1 and counts up.
        let engine_id = u64::from(state.inits);
        state.engines.insert(engine_id, FakeProperties::default());
        Ok(Box::new(FakeSynth {
            engine_id,
            state: self.state.clone(),
        }))
    }
}

struct FakeSynth {
    engine_id: u64,
    state: Arc<Mutex<FakeState>>,
}

impl FakeSynth {
    fn with_props<T>(
        &self,
        f: impl FnOnce(&mut FakeProperties) -> T,
    ) -> Result<T, EngineError> {
        let mut state = self.state.lock().unwrap();
        let props = state
            .engines
            .get_mut(&self.engine_id)
            .ok_or_else(|| EngineError::Driver("engine gone".into()))?;
        Ok(f(props))
    }

    fn check_alive(&self) -> Result<(), EngineError> {
        if self.with_props(|p| p.broken)? {
            return Err(EngineError::Driver("driver died".into()));
        }
        Ok(())
    }
}

impl Synthesizer for FakeSynth {
    fn set_rate(&mut self, words_per_minute: u32) -> Result<(), EngineError> {
        self.check_alive()?;
        self.with_props(|p| p.rate = words_per_minute)
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        self.check_alive()?;
        self.with_props(|p| p.volume = volume)
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>, EngineError> {
        Ok(vec![
            VoiceInfo {
                id: "zira".into(),
                name: "Fake Zira".into(),
            },
            VoiceInfo {
                id: "david".into(),
                name: "Fake David".into(),
            },
        ])
    }

    fn set_voice(&mut self, voice: &VoiceInfo) -> Result<(), EngineError> {
        let name = voice.name.clone();
        self.with_props(|p| p.voice = Some(name))
    }

    fn speak(&mut self, text: &str) -> Result<(), EngineError> {
        self.check_alive()?;
        let mut state = self.state.lock().unwrap();
        state.spoken.push(text.to_string());
        let hold = state.hold_speech;
        if let Some(props) = state.engines.get_mut(&self.engine_id) {
            props.speaking = hold;
        }
        Ok(())
    }

    fn is_speaking(&self) -> Result<bool, EngineError> {
        self.with_props(|p| p.speaking)
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.with_props(|p| {
            p.speaking = false;
            p.stops += 1;
        })
    }
}
