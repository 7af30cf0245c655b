// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for trashlens

use thiserror::Error;

/// Result type alias for trashlens operations
pub type Result<T> = std::result::Result<T, TrashLensError>;

/// Maximum number of characters of an upstream body kept in error messages
pub const ERROR_BODY_LIMIT: usize = 200;

/// trashlens error types
#[derive(Error, Debug)]
pub enum TrashLensError {
    /// Upstream answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    UpstreamUnavailable {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Network failure or timeout talking to an upstream
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered 2xx but the payload carried no usable text
    #[error("{0} returned an empty response")]
    EmptyResponse(&'static str),

    /// A request was made before its inputs were available
    #[error("{0}")]
    PreconditionUnmet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("Gateway error: {0}")]
    Gateway(String),
}

impl TrashLensError {
    /// Build an `UpstreamUnavailable` keeping only the head of the body
    pub fn upstream(service: &'static str, status: u16, body: &str) -> Self {
        Self::UpstreamUnavailable {
            service,
            status,
            body: truncate_chars(body, ERROR_BODY_LIMIT),
        }
    }

    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { service, source }
    }

    /// Status code of the failed upstream call, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UpstreamUnavailable { status, .. } => Some(*status),
            Self::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the failure is on our side of the request (bad input, missing selection)
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::PreconditionUnmet(_))
    }
}

/// Truncate on a char boundary
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
