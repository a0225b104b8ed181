// src/config/generation.rs
use std::env;
use std::time::Duration;

pub const ENV_BASE_URL: &str = "OLLAMA_BASE_URL";
pub const ENV_MODEL: &str = "OLLAMA_MODEL";
pub const ENV_MODE: &str = "GENERATION_MODE";
pub const ENV_PROBE_TIMEOUT_MS: &str = "GENERATION_PROBE_TIMEOUT_MS";
pub const ENV_TIMEOUT_MS: &str = "GENERATION_TIMEOUT_MS";
pub const ENV_TEMPERATURE: &str = "GENERATION_TEMPERATURE";

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "phi3:mini";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Which generation backend the service talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Real Ollama-compatible HTTP service.
    Ollama,
    /// Deterministic canned completion, no network.
    Mock,
    /// Never available; every request takes the offline path.
    Disabled,
}

impl GenerationMode {
    fn parse(raw: Option<String>) -> Self {
        match raw
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "mock" => GenerationMode::Mock,
            "disabled" | "off" | "0" => GenerationMode::Disabled,
            _ => GenerationMode::Ollama,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub mode: GenerationMode,
    /// Base address without a trailing slash.
    pub base_url: String,
    pub model: String,
    pub probe_timeout: Duration,
    pub request_timeout: Duration,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            mode: GenerationMode::Ollama,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GenerationSettings {
    /// Read settings from the environment. Missing or unparseable values fall
    /// back to the defaults; nothing here fails.
    pub fn from_env() -> Self {
        let base_url = non_empty(env::var(ENV_BASE_URL).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model =
            non_empty(env::var(ENV_MODEL).ok()).unwrap_or_else(|| DEFAULT_MODEL.to_string());

        Self {
            mode: GenerationMode::parse(env::var(ENV_MODE).ok()),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            probe_timeout: parse_ms_env(env::var(ENV_PROBE_TIMEOUT_MS).ok())
                .unwrap_or(Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS)),
            request_timeout: parse_ms_env(env::var(ENV_TIMEOUT_MS).ok())
                .unwrap_or(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            temperature: parse_temperature_env(env::var(ENV_TEMPERATURE).ok())
                .unwrap_or(DEFAULT_TEMPERATURE),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeouts(mut self, probe: Duration, request: Duration) -> Self {
        self.probe_timeout = probe;
        self.request_timeout = request;
        self
    }
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_ms_env(raw: Option<String>) -> Option<Duration> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

// parse optional float env and clamp to <0.0..=2.0>
fn parse_temperature_env(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .filter(|t| t.is_finite())
        .map(|t| t.clamp(0.0, 2.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_defaults_to_ollama() {
        assert_eq!(GenerationMode::parse(None), GenerationMode::Ollama);
        assert_eq!(GenerationMode::parse(Some(" MOCK ".into())), GenerationMode::Mock);
        assert_eq!(GenerationMode::parse(Some("off".into())), GenerationMode::Disabled);
        assert_eq!(GenerationMode::parse(Some("???".into())), GenerationMode::Ollama);
    }

    #[test]
    fn numeric_envs_are_sanitized() {
        assert_eq!(parse_ms_env(Some("250".into())), Some(Duration::from_millis(250)));
        assert_eq!(parse_ms_env(Some("0".into())), None);
        assert_eq!(parse_ms_env(Some("soon".into())), None);
        assert_eq!(parse_temperature_env(Some("9".into())), Some(2.0));
        assert_eq!(parse_temperature_env(Some("NaN".into())), None);
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        let s = GenerationSettings::default().with_base_url("http://127.0.0.1:9/");
        assert_eq!(s.base_url, "http://127.0.0.1:9");
    }
}
