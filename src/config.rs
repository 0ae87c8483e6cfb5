//! Environment-driven configuration.
//!
//! Variables are read from the process environment after loading a `.env`
//! file, if one exists:
//! - `GROQ_API_KEY` - required
//! - `GROQ_BASE_URL` - default `https://api.groq.com/openai/v1`
//! - `GROQ_MODEL` - default `llama-3.3-70b-versatile`
//! - `RUBRIQ_LLM_TIMEOUT_SECS` - default `60`

use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl GatewayConfig {
    /// Loads `.env` and reads the gateway settings from the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GROQ_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::Configuration("GROQ_API_KEY must be set to a non-empty value".into())
            })?;

        let base_url = lookup("GROQ_BASE_URL")
            .filter(|u| !u.trim().is_empty())
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let model = lookup("GROQ_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = match lookup("RUBRIQ_LLM_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().ok().filter(|s| *s > 0).ok_or_else(|| {
                Error::Configuration(format!(
                    "RUBRIQ_LLM_TIMEOUT_SECS must be a positive number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        assert!(matches!(config(&[]), Err(Error::Configuration(_))));
        assert!(matches!(
            config(&[("GROQ_API_KEY", "   ")]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn defaults_apply() {
        let config = config(&[("GROQ_API_KEY", "gsk_test")]).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn overrides_are_read() {
        let config = config(&[
            ("GROQ_API_KEY", "gsk_test"),
            ("GROQ_BASE_URL", "http://localhost:9000/v1/"),
            ("GROQ_MODEL", "llama-3.1-8b-instant"),
            ("RUBRIQ_LLM_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:9000/v1");
        assert_eq!(config.model, "llama-3.1-8b-instant");
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        assert!(matches!(
            config(&[("GROQ_API_KEY", "k"), ("RUBRIQ_LLM_TIMEOUT_SECS", "soon")]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let config = config(&[("GROQ_API_KEY", "gsk_secret")]).unwrap();
        assert!(!format!("{:?}", config).contains("gsk_secret"));
    }
}
