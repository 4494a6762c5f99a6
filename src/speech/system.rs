//! Platform speech driver backed by the `tts` crate
//! (SAPI / WinRT, speech-dispatcher, AVFoundation).

use tts::{Features, Tts};
use tracing::debug;

use super::{EngineError, SpeechDriver, Synthesizer, VoiceInfo};
use crate::settings::{MAX_SPEECH_RATE, MIN_SPEECH_RATE};

/// Words per minute that corresponds to the backend's normal rate.
const NORMAL_WPM: u32 = 150;

pub struct SystemSpeechDriver;

impl SpeechDriver for SystemSpeechDriver {
    fn init(&self) -> Result<Box<dyn Synthesizer>, EngineError> {
        let tts = Tts::default().map_err(|e| EngineError::Unavailable(e.to_string()))?;
        let features = tts.supported_features();
        debug!("Speech backend initialized: {features:?}");
        Ok(Box::new(SystemSynth { tts, features }))
    }
}

struct SystemSynth {
    tts: Tts,
    features: Features,
}

fn driver_err(e: tts::Error) -> EngineError {
    EngineError::Driver(e.to_string())
}

impl Synthesizer for SystemSynth {
    fn set_rate(&mut self, words_per_minute: u32) -> Result<(), EngineError> {
        if !self.features.rate {
            return Ok(());
        }
        let rate = map_rate(
            words_per_minute,
            self.tts.min_rate(),
            self.tts.normal_rate(),
            self.tts.max_rate(),
        );
        self.tts.set_rate(rate).map_err(driver_err)?;
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) -> Result<(), EngineError> {
        if !self.features.volume {
            return Ok(());
        }
        let volume = map_volume(volume, self.tts.min_volume(), self.tts.max_volume());
        self.tts.set_volume(volume).map_err(driver_err)?;
        Ok(())
    }

    fn voices(&self) -> Result<Vec<VoiceInfo>, EngineError> {
        if !self.features.voice {
            return Ok(Vec::new());
        }
        let voices = self.tts.voices().map_err(driver_err)?;
        Ok(voices
            .into_iter()
            .map(|v| VoiceInfo {
                id: v.id(),
                name: v.name(),
            })
            .collect())
    }

    fn set_voice(&mut self, voice: &VoiceInfo) -> Result<(), EngineError> {
        if !self.features.voice {
            return Ok(());
        }
        let voices = self.tts.voices().map_err(driver_err)?;
        let Some(native) = voices.iter().find(|v| v.id() == voice.id) else {
            return Err(EngineError::Driver(format!("voice not installed: {}", voice.name)));
        };
        self.tts.set_voice(native).map_err(driver_err)
    }

    fn speak(&mut self, text: &str) -> Result<(), EngineError> {
        self.tts.speak(text, true).map_err(driver_err)?;
        Ok(())
    }

    fn is_speaking(&self) -> Result<bool, EngineError> {
        if !self.features.is_speaking {
            return Ok(false);
        }
        self.tts.is_speaking().map_err(driver_err)
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        if !self.features.stop {
            return Ok(());
        }
        self.tts.stop().map_err(driver_err)?;
        Ok(())
    }
}

/// Map words per minute onto a backend's native rate scale: `NORMAL_WPM`
/// lands on `normal`, the ends of the settings range on `min` and `max`.
fn map_rate(words_per_minute: u32, min: f32, normal: f32, max: f32) -> f32 {
    let wpm = words_per_minute.clamp(MIN_SPEECH_RATE, MAX_SPEECH_RATE) as f32;
    let normal_wpm = NORMAL_WPM as f32;
    let rate = if wpm >= normal_wpm {
        let span = (MAX_SPEECH_RATE - NORMAL_WPM) as f32;
        normal + (wpm - normal_wpm) / span * (max - normal)
    } else {
        let span = (NORMAL_WPM - MIN_SPEECH_RATE) as f32;
        normal - (normal_wpm - wpm) / span * (normal - min)
    };
    rate.clamp(min.min(max), max.max(min))
}

fn map_volume(volume: f32, min: f32, max: f32) -> f32 {
    min + volume.clamp(0.0, 1.0) * (max - min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_wpm_maps_to_normal_rate() {
        assert!((map_rate(150, 0.1, 1.0, 10.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn range_ends_map_to_backend_limits() {
        assert!((map_rate(50, 0.5, 1.0, 2.0) - 0.5).abs() < 1e-6);
        assert!((map_rate(300, 0.5, 1.0, 2.0) - 2.0).abs() < 1e-6);
        assert!((map_rate(1000, 0.5, 1.0, 2.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn rate_interpolates_between_normal_and_max() {
        // speech-dispatcher style scale: -100..100, normal 0
        assert!((map_rate(225, -100.0, 0.0, 100.0) - 50.0).abs() < 1e-4);
        assert!((map_rate(100, -100.0, 0.0, 100.0) + 50.0).abs() < 1e-4);
    }

    #[test]
    fn volume_scaled_to_backend_range() {
        assert!((map_volume(0.5, -100.0, 100.0) - 0.0).abs() < 1e-6);
        assert!((map_volume(1.0, 0.0, 1.0) - 1.0).abs() < 1e-6);
    }
}
