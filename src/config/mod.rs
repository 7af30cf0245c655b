// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for trashlens
//!
//! Values come from three layers, later ones winning: built-in defaults, an optional JSON
//! file, and environment variables (a `.env` file is loaded first when present).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::prompts;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    /// Local vision model
    #[serde(default)]
    pub vision: VisionConfig,

    /// Workspace-scoped classification service
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Prompt templates
    #[serde(default)]
    pub prompts: PromptConfig,

    /// Web UI settings
    #[serde(default)]
    pub web: WebConfig,

    /// Chat bot settings
    #[serde(default)]
    pub bot: BotConfig,

    /// Workspace selection retention
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct VisionConfig {
    #[serde(default = "default_vision_url")]
    pub url: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_api")]
    pub api_base: String,
    /// Sent as `Authorization: Bearer <key>` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Unset means the HTTP client's default
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_vision_prompt")]
    pub vision: String,
    /// minijinja template, `{{ description }}` receives the vision output
    #[serde(default = "default_classification_prompt")]
    pub classification: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BotConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
}

// Default value functions
fn default_vision_url() -> String { "http://localhost:11434".to_string() }
fn default_vision_model() -> String { "llava:latest".to_string() }
fn default_vision_timeout() -> u64 { 120 }
fn default_classifier_api() -> String { "http://localhost:3001/api/v1".to_string() }
fn default_vision_prompt() -> String { prompts::VISION_PROMPT.to_string() }
fn default_classification_prompt() -> String { prompts::CLASSIFICATION_TEMPLATE.to_string() }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8501 }
fn default_max_upload() -> usize { 10 * 1024 * 1024 }
fn default_prefix() -> String { "!".to_string() }
fn default_max_entries() -> usize { 10_000 }
fn default_idle_ttl() -> u64 { 24 * 60 * 60 }

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            url: default_vision_url(),
            model: default_vision_model(),
            timeout_secs: default_vision_timeout(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_base: default_classifier_api(),
            api_key: None,
            timeout_secs: None,
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            vision: default_vision_prompt(),
            classification: default_classification_prompt(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            prefix: default_prefix(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            idle_ttl_secs: default_idle_ttl(),
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::TrashLensError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Load `.env`, then the JSON file, then apply process environment overrides
    pub fn load_with_env(path: &Path) -> crate::Result<Self> {
        if let Ok(env_file) = dotenv::dotenv() {
            tracing::debug!("Loaded environment from {:?}", env_file);
        }
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to resolve variables
    pub fn apply_env<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("OLLAMA_URL") {
            self.vision.url = url;
        }
        if let Some(model) = get("OLLAMA_MODEL") {
            self.vision.model = model;
        }
        if let Some(secs) = get("OLLAMA_TIMEOUT_SECS") {
            self.vision.timeout_secs = parse_env("OLLAMA_TIMEOUT_SECS", &secs)?;
        }
        if let Some(api) = get("ANYTHINGLLM_API") {
            self.classifier.api_base = api;
        }
        if let Some(key) = get("ANYTHINGLLM_API_KEY") {
            self.classifier.api_key = Some(key);
        }
        if let Some(token) = get("DISCORD_TOKEN") {
            self.bot.token = Some(token);
        }
        if let Some(host) = get("TRASHLENS_HOST") {
            self.web.host = host;
        }
        if let Some(port) = get("TRASHLENS_PORT") {
            self.web.port = parse_env("TRASHLENS_PORT", &port)?;
        }

        Ok(())
    }

    /// Bot token, failing when the bot cannot start
    pub fn require_bot_token(&self) -> crate::Result<&str> {
        self.bot
            .token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| crate::TrashLensError::Config("DISCORD_TOKEN is not set".to_string()))
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> crate::Result<T> {
    value.trim().parse().map_err(|_| {
        crate::TrashLensError::Config(format!("Invalid value for {}: {:?}", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.vision.model, "llava:latest");
        assert_eq!(config.vision.timeout_secs, 120);
        assert!(config.classifier.api_key.is_none());
        assert!(config.classifier.timeout_secs.is_none());
        assert!(config.prompts.classification.contains("{{ description }}"));
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("OLLAMA_MODEL", "llava:13b"),
            ("ANYTHINGLLM_API", "http://rag.local/api/v1"),
            ("ANYTHINGLLM_API_KEY", "secret"),
            ("TRASHLENS_PORT", "9000"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.vision.model, "llava:13b");
        assert_eq!(config.classifier.api_base, "http://rag.local/api/v1");
        assert_eq!(config.classifier.api_key.as_deref(), Some("secret"));
        assert_eq!(config.web.port, 9000);
        assert_eq!(config.vision.url, "http://localhost:11434");
    }

    #[test]
    fn test_blank_env_is_ignored() {
        let vars = env(&[("ANYTHINGLLM_API_KEY", "  ")]);
        let mut config = AppConfig::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert!(config.classifier.api_key.is_none());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let vars = env(&[("TRASHLENS_PORT", "eighty")]);
        let mut config = AppConfig::default();
        let err = config.apply_env(|k| vars.get(k).cloned()).unwrap_err();
        assert!(err.to_string().contains("TRASHLENS_PORT"));
    }

    #[test]
    fn test_bot_token_required() {
        let mut config = AppConfig::default();
        assert!(config.require_bot_token().is_err());
        config.bot.token = Some("abc".into());
        assert_eq!(config.require_bot_token().unwrap(), "abc");
    }

    #[test]
    fn test_partial_file_and_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"vision": {"model": "moondream"}}"#).unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.vision.model, "moondream");
        assert_eq!(config.vision.timeout_secs, 120);
        assert_eq!(config.bot.prefix, "!");

        config.save(&path).unwrap();
        let reloaded = AppConfig::load(&path).unwrap();
        assert_eq!(reloaded.vision.model, "moondream");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.web.port, 8501);
    }
}
