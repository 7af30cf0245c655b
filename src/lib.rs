// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! trashlens: describe-then-classify waste sorting assistant
//!
//! An image goes to a local vision model for an attribute-only description, the
//! description goes to a workspace-scoped RAG chat for a sorting label. The web UI,
//! the chat bot and the CLI all share [`pipeline::Pipeline`].

pub mod bot;
pub mod config;
pub mod error;
pub mod ollama;
pub mod pipeline;
pub mod prompts;
pub mod rag;
pub mod session;
pub mod web;

pub use config::AppConfig;
pub use error::{Result, TrashLensError};
