// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! AnythingLLM client: workspace directory and workspace-scoped chat

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::AppConfig;
use crate::{Result, TrashLensError};

const SERVICE: &str = "AnythingLLM";

/// Client for the retrieval-augmented classification service
#[derive(Clone)]
pub struct RagClient {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest<'a> {
    message: &'a str,
    mode: &'static str,
    return_source_docs: bool,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ChatResponse {
    text_response: Option<String>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct WorkspacesResponse {
    #[serde(default)]
    workspaces: Vec<WorkspaceEntry>,
}

#[derive(Deserialize)]
struct WorkspaceEntry {
    slug: Option<String>,
}

impl RagClient {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Option<Duration>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| TrashLensError::Config("API key contains invalid characters".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| TrashLensError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            &config.classifier.api_base,
            config.classifier.api_key.as_deref(),
            config.classifier.timeout_secs.map(Duration::from_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Slugs of all workspaces, in server order, skipping entries without one
    pub async fn list_workspaces(&self) -> Result<Vec<String>> {
        let url = format!("{}/workspaces", self.base_url);

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

        let listing: WorkspacesResponse = response
            .json()
            .await
            .map_err(|e| TrashLensError::transport(SERVICE, e))?;

        Ok(listing
            .workspaces
            .into_iter()
            .filter_map(|w| w.slug)
            .filter(|slug| !slug.is_empty())
            .collect())
    }

    /// Send one chat message to a workspace and return its text answer
    pub async fn chat(&self, workspace: &str, message: &str) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| TrashLensError::Config(format!("Invalid classifier URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| TrashLensError::Config("Classifier URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["workspace", workspace, "chat"]);

        let request = ChatRequest {
            message,
            mode: "chat",
            return_source_docs: false,
        };

        debug!("Sending chat request to AnythingLLM: workspace={}", workspace);

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TrashLensError::transport(SERVICE, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TrashLensError::transport(SERVICE, e))?;
        if !status.is_success() {
            return Err(TrashLensError::upstream(SERVICE, status.as_u16(), &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)?;
        parsed
            .text_response
            .filter(|t| !t.trim().is_empty())
            .or(parsed.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(TrashLensError::EmptyResponse(SERVICE))
    }
}
