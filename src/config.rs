//! Runtime configuration from environment variables (optionally via `.env`).

use crate::tts::VoiceParams;
use std::time::Duration;

/// Maximum characters per synthesis chunk. Kept comfortably under the
/// backend's request ceiling.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 2500;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8880/v1/audio/speech";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Service bind address, e.g. `127.0.0.1:8080`.
    pub bind: String,
    /// Synthesis backend endpoint.
    pub backend_url: String,
    /// Per-request timeout for backend calls.
    pub request_timeout: Duration,
    pub voice: VoiceParams,
    pub max_chunk_chars: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            voice: VoiceParams::default(),
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

impl Settings {
    /// Read settings from the environment, falling back to defaults.
    /// Unparseable numeric values are logged and defaulted rather than
    /// aborting startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let voice = VoiceParams {
            name: env_string("TTS_DEFAULT_VOICE_NAME", defaults.voice.name),
            speaking_rate: env_parsed("TTS_DEFAULT_SPEAKING_RATE", defaults.voice.speaking_rate),
            pitch: env_parsed("TTS_DEFAULT_PITCH", defaults.voice.pitch),
        };
        Self {
            bind: env_string("ALOUD_BIND", defaults.bind),
            backend_url: env_string("TTS_BACKEND_URL", defaults.backend_url),
            request_timeout: Duration::from_secs(env_parsed(
                "TTS_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            voice,
            max_chunk_chars: env_parsed("TTS_MAX_CHUNK_CHARS", defaults.max_chunk_chars),
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default,
    }
}

fn env_parsed<T: std::str::FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(value) => match value.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                log::warn!("invalid {}={:?}, using default {}", key, value, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.max_chunk_chars, 2500);
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
        assert_eq!(settings.voice.name, "en-US-Journey-F");
    }

    #[test]
    fn invalid_numeric_env_falls_back() {
        // Env is process-global; use a key no other test touches.
        std::env::set_var("TTS_MAX_CHUNK_CHARS", "not-a-number");
        let settings = Settings::from_env();
        assert_eq!(settings.max_chunk_chars, DEFAULT_MAX_CHUNK_CHARS);
        std::env::remove_var("TTS_MAX_CHUNK_CHARS");
    }
}
