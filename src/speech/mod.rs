//! Speech output: driver abstraction, engine pool and request dispatcher.
//!
//! Components:
//! - `pool`: at most one pooled synthesizer, reused across requests
//! - `dispatcher`: runs speak requests off the UI thread, newest wins
//! - `system`: the platform speech driver (via the `tts` crate)

pub mod dispatcher;
pub mod pool;
pub mod system;

#[cfg(test)]
pub(crate) mod fake;

pub use dispatcher::{DispatchState, SpeechDispatcher};
pub use pool::EnginePool;

/// Failures from the underlying speech driver.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// The driver could not be initialized (or re-initialized).
    #[error("speech engine unavailable: {0}")]
    Unavailable(String),

    /// A live engine rejected a call.
    #[error("speech engine error: {0}")]
    Driver(String),
}

/// Properties applied to an engine each time it is handed out.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceProfile {
    /// Words per minute (50–300, 150 is the driver's normal rate).
    pub rate: u32,
    /// 0.0–1.0
    pub volume: f32,
    /// Case-insensitive substring of the preferred voice's name.
    pub voice_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
}

/// One live synthesizer instance. Not safe for concurrent use; the pool
/// wraps each one in a mutex.
pub trait Synthesizer: Send {
    fn set_rate(&mut self, words_per_minute: u32) -> Result<(), EngineError>;
    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError>;
    fn voices(&self) -> Result<Vec<VoiceInfo>, EngineError>;
    fn set_voice(&mut self, voice: &VoiceInfo) -> Result<(), EngineError>;
    /// Start speaking, replacing anything already queued. Returns once the
    /// utterance is underway.
    fn speak(&mut self, text: &str) -> Result<(), EngineError>;
    fn is_speaking(&self) -> Result<bool, EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
}

/// Creates synthesizer instances.
pub trait SpeechDriver: Send + Sync {
    fn init(&self) -> Result<Box<dyn Synthesizer>, EngineError>;
}

/// Pick the first voice whose name contains `preferred` (ignoring case),
/// falling back to the first installed voice.
pub fn select_voice<'a>(voices: &'a [VoiceInfo], preferred: &str) -> Option<&'a VoiceInfo> {
    let needle = preferred.to_lowercase();
    voices
        .iter()
        .find(|v| v.name.to_lowercase().contains(&needle))
        .or_else(|| voices.first())
}
