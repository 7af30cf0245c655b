// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Ollama API client for local image description

use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::{Result, TrashLensError};

const SERVICE: &str = "Ollama";

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    prompt: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ModelInfo {
    name: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: &str, model: &str, prompt: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TrashLensError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
            model: model.to_string(),
            prompt: prompt.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.vision.url,
            &config.vision.model,
            &config.prompts.vision,
            Duration::from_secs(config.vision.timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| TrashLensError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrashLensError::upstream(SERVICE, status.as_u16(), &body));
        }

        Ok(())
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TrashLensError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrashLensError::upstream(SERVICE, status.as_u16(), &body));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| TrashLensError::transport(SERVICE, e))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Check if the configured model is pulled
    pub async fn model_available(&self) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models
            .iter()
            .any(|m| m == &self.model || m.starts_with(&format!("{}:", self.model))))
    }

    /// Describe an image with the fixed vision prompt
    pub async fn describe_image(&self, image: &[u8]) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = GenerateRequest {
            model: &self.model,
            prompt: &self.prompt,
            images: vec![general_purpose::STANDARD.encode(image)],
            stream: false,
        };

        debug!("Sending vision request to Ollama: model={} bytes={}", self.model, image.len());

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TrashLensError::transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrashLensError::upstream(SERVICE, status.as_u16(), &body));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TrashLensError::transport(SERVICE, e))?;
        Ok(result.response.trim().to_string())
    }
}

/// Strip endpoint paths so both `http://host:11434` and `.../api/generate` work
fn normalize_base_url(base_url: &str) -> String {
    base_url
        .trim_end_matches('/')
        .replace("/api/generate", "")
        .replace("/api/chat", "")
}
