//! Agents answer one `/ask` message each.
//!
//! [`Agent`] is an enum over the three kinds; [`build`] picks one from config
//! and wires its backends.  Every agent is cheap to clone; session state lives
//! behind `Arc`s inside.

pub mod gemini_chat;
pub mod rag;
pub mod turn_chat;

use thiserror::Error;
use tracing::info;

use crate::chat::new_session_id;
use crate::config::{AgentKind, Config};
use crate::error::AppError;
use crate::gcp::GcpContext;
use crate::instructions::{self, InstructionWatcher};
use crate::llm::{ProviderError, providers};
use crate::retrieval;

// ── Request / response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct AskInput {
    /// Client-supplied session id; `None` or empty starts a new session.
    pub session: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskOutput {
    /// `None` for stateless agents.
    pub session: Option<String>,
    pub message: String,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AgentError {
    /// A chat turn failed; history was left untouched.
    #[error("chat response error: {0}")]
    Chat(#[source] ProviderError),

    #[error("{0}")]
    Embedding(#[source] ProviderError),

    #[error("{0}")]
    Retrieval(#[source] ProviderError),

    #[error("{0}")]
    Inference(#[source] ProviderError),
}

// ── Agent enum ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Agent {
    TurnChat(turn_chat::TurnChatAgent),
    GeminiChat(gemini_chat::GeminiChatAgent),
    Rag(rag::RagAgent),
}

impl Agent {
    pub fn kind(&self) -> AgentKind {
        match self {
            Agent::TurnChat(_) => AgentKind::TurnChat,
            Agent::GeminiChat(_) => AgentKind::GeminiChat,
            Agent::Rag(_) => AgentKind::Rag,
        }
    }

    pub async fn ask(&self, input: AskInput) -> Result<AskOutput, AgentError> {
        match self {
            Agent::TurnChat(a) => a.ask(input).await,
            Agent::GeminiChat(a) => a.ask(input).await,
            Agent::Rag(a) => a.ask(input).await,
        }
    }

    /// Live sessions; always zero for stateless agents.
    pub async fn session_count(&self) -> usize {
        match self {
            Agent::TurnChat(a) => a.sessions().len().await,
            Agent::GeminiChat(a) => a.sessions().len().await,
            Agent::Rag(_) => 0,
        }
    }
}

/// The caller's session id, or a fresh one.
pub(crate) fn resolve_session(session: Option<String>) -> String {
    session.filter(|s| !s.trim().is_empty()).unwrap_or_else(new_session_id)
}

// ── Construction ──────────────────────────────────────────────────────────────

/// Whether any configured backend talks to Google Cloud.
fn needs_gcp(cfg: &Config) -> bool {
    cfg.llm.provider != "dummy"
        || (cfg.agent == AgentKind::Rag
            && (cfg.embedding.provider != "dummy" || cfg.retrieval.provider != "static"))
}

fn provider_err(e: ProviderError) -> AppError {
    AppError::Config(e.to_string())
}

/// Build the configured agent.
///
/// Also returns the instruction-file watcher when the Gemini chat agent
/// loaded its instructions from a file; the caller runs it as a component.
pub async fn build(cfg: &Config) -> Result<(Agent, Option<InstructionWatcher>), AppError> {
    let gcp = if needs_gcp(cfg) { Some(GcpContext::resolve(&cfg.gcp).await?) } else { None };
    if let Some(g) = &gcp {
        info!(project = %g.project_id(), region = %g.region(), "google cloud context resolved");
    }

    let model = providers::build(&cfg.llm, gcp.as_ref()).map_err(provider_err)?;
    info!(agent = %cfg.agent, model = model.name(), "building agent");

    match cfg.agent {
        AgentKind::TurnChat => Ok((Agent::TurnChat(turn_chat::TurnChatAgent::new(model)), None)),
        AgentKind::GeminiChat => {
            if !matches!(model.name(), "gemini" | "dummy") {
                return Err(AppError::Config(format!(
                    "gemini_chat agent needs a chat-capable model backend, got '{}'",
                    model.name()
                )));
            }
            let (instructions, watched) = instructions::load(&cfg.instructions);
            let watcher = watched.map(|path| {
                InstructionWatcher::new(
                    path,
                    instructions.clone(),
                    std::time::Duration::from_secs(cfg.instructions.poll_seconds),
                )
            });
            Ok((Agent::GeminiChat(gemini_chat::GeminiChatAgent::new(model, instructions)), watcher))
        }
        AgentKind::Rag => {
            let embedder = retrieval::build_embedder(&cfg.embedding, gcp.as_ref()).map_err(provider_err)?;
            let search = retrieval::build_search(&cfg.retrieval, gcp.as_ref()).map_err(provider_err)?;
            info!(embedder = embedder.name(), search = search.name(), "retrieval configured");
            Ok((Agent::Rag(rag::RagAgent::new(embedder, search, model)), None))
        }
    }
}
