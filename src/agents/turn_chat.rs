//! Raw-prompt chat over a custom prediction endpoint.

use std::sync::Arc;

use tracing::debug;

use crate::agents::{AgentError, AskInput, AskOutput, resolve_session};
use crate::chat::{SessionMap, TurnChat};
use crate::llm::TextModel;

#[derive(Debug, Clone)]
pub struct TurnChatAgent {
    model: TextModel,
    sessions: Arc<SessionMap<TurnChat>>,
}

impl TurnChatAgent {
    pub fn new(model: TextModel) -> Self {
        Self { model, sessions: Arc::new(SessionMap::new()) }
    }

    pub fn sessions(&self) -> &SessionMap<TurnChat> {
        &self.sessions
    }

    pub async fn ask(&self, input: AskInput) -> Result<AskOutput, AgentError> {
        let session_id = resolve_session(input.session);
        let session = self.sessions.get_or_create(&session_id).await;
        let mut session = session.lock().await;

        let reply = session.state.send(&self.model, &input.message).await.map_err(AgentError::Chat)?;
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
