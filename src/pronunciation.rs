//! IPA lookup for single English words.
//!
//! Sources, in priority order:
//! 1. a small override table for words the dictionary gets wrong
//! 2. the CMUdict IPA dictionary file (downloaded on first start)
//! 3. misaki-rs grapheme-to-phoneme conversion

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::settings::write_replace;

const OVERRIDES: &[(&str, &str)] = &[
    ("yamin", "jɑːˈmiːn"),
    ("million", "ˈmɪl.jən"),
    ("billion", "ˈbɪl.jən"),
];

const IPA_PATTERN: &str =
    r"^[ˈˌa-zA-Zɪʊəɔæɑɛʌθðŋʃʒɹɝɚɡɾɫʔʤʧːˑ˞ˠˤ\x{0329}\x{032F}\x{0303}ʼ˺.\s,\-]+$";

fn ipa_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(IPA_PATTERN).expect("IPA pattern is valid"))
}

/// Whether `s` only uses characters expected in an English IPA transcription.
pub fn is_valid_english_ipa(s: &str) -> bool {
    ipa_regex().is_match(s)
}

/// What the pronunciation label should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pronunciation {
    Found(String),
    /// A transcription exists but contains characters outside English IPA.
    Unverified(String),
    NotFound,
    NotSingleWord,
    /// IPA display is switched off.
    Hidden,
}

impl Pronunciation {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn display_text(&self) -> String {
        match self {
            Self::Found(ipa) => ipa.clone(),
            Self::Unverified(raw) => format!("(Not found, raw: {raw})"),
            Self::NotFound => "(Not found)".into(),
            Self::NotSingleWord => "(Enter a single English word)".into(),
            Self::Hidden => String::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DictionaryError {
    #[error("failed to download dictionary: {0}")]
    Download(#[from] reqwest::Error),

    #[error("dictionary download returned HTTP {0}")]
    Status(u16),

    #[error("dictionary file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Word → IPA map parsed from a CMUdict-IPA style file.
#[derive(Debug, Default)]
pub struct IpaDictionary {
    entries: HashMap<String, String>,
}

impl IpaDictionary {
    /// Parse lines of `WORD  transcription` (two spaces or a tab), skipping
    /// blank lines and `;` comments.
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with(';'))
            .filter_map(|line| {
                let line = line.trim();
                let (word, ipa) = line.split_once("  ").or_else(|| line.split_once('\t'))?;
                let (word, ipa) = (word.trim(), ipa.trim());
                if word.is_empty() || ipa.is_empty() {
                    return None;
                }
                Some((word.to_lowercase(), ipa.to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, DictionaryError> {
        let contents = fs::read_to_string(path)?;
        let dict = Self::parse(&contents);
        info!("Loaded {} IPA dictionary entries from {}", dict.len(), path.display());
        Ok(dict)
    }

    /// Load `path`, downloading it from `url` first if it doesn't exist.
    /// Falls back to an empty dictionary on any failure.
    pub fn load_or_download(path: &Path, url: &str, download: bool) -> Self {
        if !path.exists() {
            if !download {
                info!("No IPA dictionary at {}", path.display());
                return Self::default();
            }
            if let Err(e) = download_dictionary(path, url) {
                warn!("{e}");
                return Self::default();
            }
        }
        Self::load(path).unwrap_or_else(|e| {
            warn!("Failed to load IPA dictionary: {e}");
            Self::default()
        })
    }

    pub fn get(&self, word: &str) -> Option<&str> {
        self.entries.get(word).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn download_dictionary(path: &Path, url: &str) -> Result<(), DictionaryError> {
    info!("Downloading IPA dictionary from {url}");
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let resp = client.get(url).send()?;
    if !resp.status().is_success() {
        return Err(DictionaryError::Status(resp.status().as_u16()));
    }
    let body = resp.bytes()?;

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    write_replace(path, &body)?;
    info!("Download complete: {} bytes", body.len());
    Ok(())
}

/// Last-resort spelling-to-sound conversion.
pub trait PhonemeConverter {
    fn convert(&self, word: &str) -> Option<String>;
}

pub struct MisakiConverter {
    g2p: misaki_rs::G2P,
}

impl MisakiConverter {
    pub fn new() -> Self {
        Self {
            g2p: misaki_rs::G2P::new(misaki_rs::Language::EnglishUS),
        }
    }
}

impl PhonemeConverter for MisakiConverter {
    fn convert(&self, word: &str) -> Option<String> {
        match self.g2p.g2p(word) {
            Ok((phonemes, _tokens)) => Some(phonemes.trim().to_string()),
            Err(e) => {
                debug!("G2P failed for {word:?}: {e}");
                None
            }
        }
    }
}

pub struct Pronouncer {
    dictionary: IpaDictionary,
    fallback: Option<Box<dyn PhonemeConverter>>,
}

impl Pronouncer {
    pub fn new(dictionary: IpaDictionary, fallback: Option<Box<dyn PhonemeConverter>>) -> Self {
        Self {
            dictionary,
            fallback,
        }
    }

    /// Raw transcription of a single word, without validation.
    pub fn transcribe(&self, word: &str) -> Option<String> {
        let lower = word.to_lowercase();

        if let Some((_, ipa)) = OVERRIDES.iter().find(|(w, _)| *w == lower) {
            return Some((*ipa).to_string());
        }
        if let Some(ipa) = self.dictionary.get(&lower) {
            return Some(ipa.to_string());
        }

        let converted = self.fallback.as_ref()?.convert(word)?;
        if converted.is_empty() || converted == word {
            return None;
        }
        Some(converted)
    }

    /// What to show for `text`, honouring the `show_ipa` setting.
    pub fn describe(&self, text: &str, show_ipa: bool) -> Pronunciation {
        if !show_ipa {
            return Pronunciation::Hidden;
        }

        let mut words = text.split_whitespace();
        let (Some(word), None) = (words.next(), words.next()) else {
            return Pronunciation::NotSingleWord;
        };

        match self.transcribe(word) {
            Some(ipa) if is_valid_english_ipa(&ipa) => Pronunciation::Found(ipa),
            Some(raw) => Pronunciation::Unverified(raw),
            None => Pronunciation::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoConverter(Option<&'static str>);

    impl PhonemeConverter for EchoConverter {
        fn convert(&self, word: &str) -> Option<String> {
            Some(self.0.map_or_else(|| word.to_string(), str::to_string))
        }
    }

    const SAMPLE: &str = ";;; comment line\n\
        HELLO  həˈloʊ\n\
        MILLION  ˈmɪljən\n\
        WORLD\twɝld\n\
        \n\
        BROKEN\n";

    fn pronouncer(fallback: Option<&'static str>) -> Pronouncer {
        Pronouncer::new(
            IpaDictionary::parse(SAMPLE),
            Some(Box::new(EchoConverter(fallback))),
        )
    }

    #[test]
    fn dictionary_parsing_skips_comments_and_malformed_lines() {
        let dict = IpaDictionary::parse(SAMPLE);
        assert_eq!(dict.len(), 3);
        assert_eq!(dict.get("hello"), Some("həˈloʊ"));
        assert_eq!(dict.get("world"), Some("wɝld"));
        assert_eq!(dict.get("broken"), None);
    }

    #[test]
    fn override_beats_dictionary() {
        let p = pronouncer(None);
        assert_eq!(p.transcribe("Million").as_deref(), Some("ˈmɪl.jən"));
    }

    #[test]
    fn dictionary_beats_fallback() {
        let p = pronouncer(Some("xxx"));
        assert_eq!(p.transcribe("HELLO").as_deref(), Some("həˈloʊ"));
        assert_eq!(p.transcribe("other").as_deref(), Some("xxx"));
    }

    #[test]
    fn fallback_echo_is_a_miss() {
        let p = pronouncer(None);
        assert_eq!(p.transcribe("zzyzx"), None);
        assert_eq!(p.describe("zzyzx", true), Pronunciation::NotFound);
    }

    #[test]
    fn describe_states() {
        let p = pronouncer(Some("ʘʘ"));
        assert_eq!(p.describe("hello", true), Pronunciation::Found("həˈloʊ".into()));
        assert_eq!(p.describe("hello", false), Pronunciation::Hidden);
        assert_eq!(p.describe("hello world", true), Pronunciation::NotSingleWord);
        assert_eq!(p.describe("qwerty", true), Pronunciation::Unverified("ʘʘ".into()));
    }

    #[test]
    fn display_text_for_misses() {
        assert_eq!(Pronunciation::NotFound.display_text(), "(Not found)");
        assert_eq!(
            Pronunciation::Unverified("ʘ".into()).display_text(),
            "(Not found, raw: ʘ)"
        );
        assert_eq!(Pronunciation::Hidden.display_text(), "");
    }

    #[test]
    fn ipa_validation() {
        assert!(is_valid_english_ipa("həˈloʊ"));
        assert!(is_valid_english_ipa("ˈmɪl.jən"));
        assert!(!is_valid_english_ipa("ʘʘ"));
        assert!(!is_valid_english_ipa(""));
    }

    #[test]
    fn missing_dictionary_without_download_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let dict = IpaDictionary::load_or_download(
            &dir.path().join("cmudict.txt"),
            "http://127.0.0.1:9/unused",
            false,
        );
        assert!(dict.is_empty());
    }

    #[test]
    fn dictionary_loaded_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmudict.txt");
        fs::write(&path, SAMPLE).unwrap();
        let dict = IpaDictionary::load_or_download(&path, "http://127.0.0.1:9/unused", true);
        assert_eq!(dict.len(), 3);
    }
}
