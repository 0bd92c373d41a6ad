//! Gemini chat with structured history and shared system instructions.

use std::sync::Arc;

use tracing::debug;

use crate::agents::{AgentError, AskInput, AskOutput, resolve_session};
use crate::chat::{ChatHistory, SessionMap};
use crate::instructions::SystemInstructions;
use crate::llm::TextModel;

#[derive(Debug, Clone)]
pub struct GeminiChatAgent {
    model: TextModel,
    instructions: SystemInstructions,
    sessions: Arc<SessionMap<ChatHistory>>,
}

impl GeminiChatAgent {
    pub fn new(model: TextModel, instructions: SystemInstructions) -> Self {
        Self { model, instructions, sessions: Arc::new(SessionMap::new()) }
    }

    pub fn sessions(&self) -> &SessionMap<ChatHistory> {
        &self.sessions
    }

    pub fn instructions(&self) -> &SystemInstructions {
        &self.instructions
    }

    pub async fn ask(&self, input: AskInput) -> Result<AskOutput, AgentError> {
        let session_id = resolve_session(input.session);
        let session = self.sessions.get_or_create(&session_id).await;
        let mut session = session.lock().await;

        // Read per turn so a reload applies to every session's next message.
        let system = self.instructions.get();
        let reply = session
            .state
            .send(&self.model, Some(&*system), &input.message)
            .await
            .map_err(AgentError::Chat)?;
        debug!(
            session = %session_id,
            session_age_secs = session.age_secs(),
            prompt = %input.message,
            response = %reply,
            "ask request processed"
        );
        Ok(AskOutput { session: Some(session_id), message: reply })
    }
}
