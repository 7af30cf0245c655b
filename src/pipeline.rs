// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Describe-then-classify pipeline shared by the web UI, the chat bot and the CLI

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::ollama::OllamaClient;
use crate::prompts::{self, Category};
use crate::rag::RagClient;
use crate::{Result, TrashLensError};

/// Turns image bytes into a textual description
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, image: &[u8]) -> Result<String>;
}

/// Turns a workspace-scoped prompt into a label
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, workspace: &str, prompt: &str) -> Result<String>;
}

/// Enumerates the workspaces a user may pick from
#[async_trait]
pub trait WorkspaceDirectory: Send + Sync {
    async fn list_workspaces(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl Describer for OllamaClient {
    async fn describe(&self, image: &[u8]) -> Result<String> {
        self.describe_image(image).await
    }
}

#[async_trait]
impl Classifier for RagClient {
    async fn classify(&self, workspace: &str, prompt: &str) -> Result<String> {
        self.chat(workspace, prompt).await
    }
}

#[async_trait]
impl WorkspaceDirectory for RagClient {
    async fn list_workspaces(&self) -> Result<Vec<String>> {
        RagClient::list_workspaces(self).await
    }
}

/// Where a request is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingWorkspace,
    AwaitingImage,
    Describing,
    Classifying,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::AwaitingWorkspace => "workspace selection",
            Stage::AwaitingImage => "image upload",
            Stage::Describing => "image description",
            Stage::Classifying => "classification",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A failure together with the stage it stopped at
#[derive(Error, Debug)]
#[error("{stage} failed: {error}")]
pub struct StageError {
    pub stage: Stage,
    #[source]
    pub error: TrashLensError,
}

impl StageError {
    fn at(stage: Stage, error: TrashLensError) -> Self {
        Self { stage, error }
    }
}

/// Successful run of the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub workspace: String,
    pub description: String,
    pub label: String,
    /// Guidance category mentioned by the label, if any
    pub category: Option<Category>,
    pub analyzed_at: DateTime<Utc>,
}

/// The shared two-stage pipeline
#[derive(Clone)]
pub struct Pipeline {
    describer: Arc<dyn Describer>,
    classifier: Arc<dyn Classifier>,
    directory: Arc<dyn WorkspaceDirectory>,
    classification_template: String,
}

impl Pipeline {
    pub fn new(
        describer: Arc<dyn Describer>,
        classifier: Arc<dyn Classifier>,
        directory: Arc<dyn WorkspaceDirectory>,
        classification_template: impl Into<String>,
    ) -> Self {
        Self {
            describer,
            classifier,
            directory,
            classification_template: classification_template.into(),
        }
    }

    /// Wire the Ollama and AnythingLLM clients from configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let vision = Arc::new(OllamaClient::from_config(config)?);
        let rag = Arc::new(RagClient::from_config(config)?);
        Ok(Self::new(
            vision,
            rag.clone(),
            rag,
            config.prompts.classification.clone(),
        ))
    }

    pub async fn list_workspaces(&self) -> Result<Vec<String>> {
        self.directory.list_workspaces().await
    }

    /// Describe the image
    async fn describe(&self, image: &[u8]) -> std::result::Result<String, StageError> {
        if image.is_empty() {
            return Err(StageError::at(
                Stage::AwaitingImage,
                TrashLensError::PreconditionUnmet("no image received".to_string()),
            ));
        }

        debug!("Stage: {}", Stage::Describing);
        let description = self
            .describer
            .describe(image)
            .await
            .map_err(|e| StageError::at(Stage::Describing, e))?;

        if description.trim().is_empty() {
            return Err(StageError::at(
                Stage::Describing,
                TrashLensError::EmptyResponse("Ollama"),
            ));
        }
        Ok(description)
    }

    /// Classify an existing description within a workspace
    async fn classify(
        &self,
        workspace: &str,
        description: &str,
    ) -> std::result::Result<String, StageError> {
        debug!("Stage: {}", Stage::Classifying);
        let prompt = prompts::render_classification(&self.classification_template, description)
            .map_err(|e| StageError::at(Stage::Classifying, e))?;
        self.classifier
            .classify(workspace, &prompt)
            .await
            .map_err(|e| StageError::at(Stage::Classifying, e))
    }

    /// Selection check and describe only; the description is not classified
    pub async fn describe_only(
        &self,
        workspace: Option<&str>,
        image: &[u8],
    ) -> std::result::Result<String, StageError> {
        let workspace = selected(workspace)?;
        info!("Describing {} byte image in workspace {}", image.len(), workspace);
        self.describe(image).await.inspect_err(|e| warn!("{}", e))
    }

    /// Run the whole request: selection check, describe, classify
    pub async fn analyze(
        &self,
        workspace: Option<&str>,
        image: &[u8],
    ) -> std::result::Result<Analysis, StageError> {
        let workspace = selected(workspace)?;

        info!("Analyzing {} byte image in workspace {}", image.len(), workspace);

        let description = self.describe(image).await.inspect_err(|e| warn!("{}", e))?;
        let label = self
            .classify(workspace, &description)
            .await
            .inspect_err(|e| warn!("{}", e))?;

        let category = Category::detect(&label);
        info!("Classified as {:?} ({:?})", label, category);

        Ok(Analysis {
            workspace: workspace.to_string(),
            description,
            label,
            category,
            analyzed_at: Utc::now(),
        })
    }
}

fn selected(workspace: Option<&str>) -> std::result::Result<&str, StageError> {
    workspace.map(str::trim).filter(|w| !w.is_empty()).ok_or_else(|| {
        StageError::at(
            Stage::AwaitingWorkspace,
            TrashLensError::PreconditionUnmet("select a workspace first".to_string()),
        )
    })
}
