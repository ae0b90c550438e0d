use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub recognition: RecognitionConfig,
    pub capture: CaptureSettings,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    /// Base URL of the generative language API, without trailing slash
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Usually supplied through GEMINI_API_KEY instead of the file
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureSettings {
    /// Length of the automatic recording window
    pub duration_secs: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_duration_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl CaptureSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

impl Config {
    /// Load configuration from an optional file, then `TUNEGEM__*` env vars.
    ///
    /// `path` is passed to `config::File::with_name`, so the extension may be omitted.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("recognition.api_base", "https://generativelanguage.googleapis.com/v1beta")?
            .set_default("recognition.model", "gemini-2.5-flash")?
            .set_default("recognition.temperature", 0.4)?
            .set_default("recognition.timeout_secs", 60)?
            .set_default("capture.duration_secs", 10)?
            .set_default("capture.sample_rate", 16000)?
            .set_default("capture.channels", 1)?
            .set_default("capture.buffer_duration_ms", 100)?
            .set_default("http.bind", "127.0.0.1")?
            .set_default("http.port", 8787)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("TUNEGEM").separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_a_file() {
        let cfg = Config::load("/nonexistent/tunegem-config").unwrap();
        assert_eq!(cfg.capture.duration_secs, 10);
        assert_eq!(cfg.capture.window(), Duration::from_secs(10));
        assert_eq!(cfg.recognition.model, "gemini-2.5-flash");
        assert!((cfg.recognition.temperature - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunegem.toml");
        std::fs::write(
            &path,
            "[capture]\nduration_secs = 6\n\n[http]\nport = 9000\n",
        )
        .unwrap();

        let cfg = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.capture.duration_secs, 6);
        assert_eq!(cfg.http.port, 9000);
        assert_eq!(cfg.capture.sample_rate, 16000);
    }
}
