//! Model backend abstraction.
//!
//! `TextModel` is an enum over concrete backends.  Add a new variant +
//! module in `providers/` for each additional backend.
//!
//! Instances are shared immutable capabilities — clone them freely.  Two
//! call shapes exist: [`TextModel::complete`] sends one raw prompt string,
//! [`TextModel::chat`] sends structured turns plus an optional system
//! instruction.  History management lives in `crate::chat`; backends are
//! stateless.

pub mod providers;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("{0}")]
    Config(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("failed to parse response body: {0}")]
    Decode(String),
    #[error("{0}")]
    EmptyResponse(String),
    #[error("model failed to respond: {0}")]
    NoResponse(String),
    #[error("{0}")]
    Unexpected(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

// ── Conversation types ────────────────────────────────────────────────────────

/// Author of a conversation turn, named as the Gemini API names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One turn of a structured conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: Role,
    pub text: String,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self { role: Role::Model, text: text.into() }
    }
}

// ── Backend enum ──────────────────────────────────────────────────────────────

/// All available model backends.
#[derive(Debug, Clone)]
pub enum TextModel {
    Dummy(providers::dummy::DummyProvider),
    Prediction(providers::prediction::PredictionProvider),
    Gemini(providers::gemini::GeminiProvider),
}

impl TextModel {
    /// Backend name, as used in `[llm] default = "..."`.
    pub fn name(&self) -> &'static str {
        match self {
            TextModel::Dummy(_) => "dummy",
            TextModel::Prediction(_) => "prediction",
            TextModel::Gemini(_) => "gemini",
        }
    }

    /// Send `prompt` as a single user turn and return the reply text.
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        match self {
            TextModel::Dummy(p) => p.complete(prompt),
            TextModel::Prediction(p) => p.complete(prompt).await,
            TextModel::Gemini(p) => p.complete(prompt).await,
        }
    }

    /// Send the whole conversation with an optional system instruction.
    ///
    /// Returns `Ok(None)` when the model produced no candidate at all.
    pub async fn chat(&self, system: Option<&str>, contents: &[Content]) -> Result<Option<String>, ProviderError> {
        match self {
            TextModel::Dummy(p) => p.chat(system, contents),
            TextModel::Prediction(_) => Err(ProviderError::Unsupported(
                "prediction endpoints accept raw prompts only".into(),
            )),
            TextModel::Gemini(p) => p.generate(system, contents).await,
        }
    }
}
