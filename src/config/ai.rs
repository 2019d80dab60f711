// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_max_tokens() -> u32 {
    800
}
fn default_temperature() -> f32 {
    0.3
}

/// `[ai]` table of the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: default_api_key(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// `AI_TEST_MODE=mock` swaps any configured provider for the deterministic mock.
pub fn test_mode_mock() -> bool {
    env::var("AI_TEST_MODE")
        .map(|v| v.eq_ignore_ascii_case("mock"))
        .unwrap_or(false)
}

impl AiConfig {
    /// Normalize the provider name and resolve an `"ENV"` API key.
    pub fn resolve(&mut self) -> anyhow::Result<()> {
        self.provider = self.provider.trim().to_lowercase();

        if !self.enabled || test_mode_mock() {
            return Ok(());
        }

        match self.provider.as_str() {
            "openai" => {
                if self.api_key.trim().eq_ignore_ascii_case("env") {
                    self.api_key = env::var("OPENAI_API_KEY")
                        .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?;
                }
            }
            "mock" => {}
            other => anyhow::bail!("Unsupported provider in config: {other}"),
        }

        // Sanitize sampling knobs
        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn env_key_is_resolved() {
        env::remove_var("AI_TEST_MODE");
        env::set_var("OPENAI_API_KEY", "sk-test");
        let mut cfg = AiConfig {
            enabled: true,
            provider: "OpenAI".into(),
            ..AiConfig::default()
        };
        cfg.resolve().unwrap();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.api_key, "sk-test");
        env::remove_var("OPENAI_API_KEY");
    }

    #[test]
    #[serial]
    fn missing_key_is_an_error_unless_mocked() {
        env::remove_var("OPENAI_API_KEY");
        env::remove_var("AI_TEST_MODE");
        let mut cfg = AiConfig {
            enabled: true,
            ..AiConfig::default()
        };
        assert!(cfg.resolve().is_err());

        env::set_var("AI_TEST_MODE", "mock");
        let mut cfg = AiConfig {
            enabled: true,
            ..AiConfig::default()
        };
        assert!(cfg.resolve().is_ok());
        env::remove_var("AI_TEST_MODE");
    }

    #[test]
    #[serial]
    fn unknown_provider_rejected() {
        env::remove_var("AI_TEST_MODE");
        let mut cfg = AiConfig {
            enabled: true,
            provider: "claude".into(),
            ..AiConfig::default()
        };
        assert!(cfg.resolve().is_err());
    }
}
