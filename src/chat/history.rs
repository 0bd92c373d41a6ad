//! Structured chat history for models with native multi-turn input.

use crate::chat::response::or_empty;
use crate::llm::{Content, ProviderError, TextModel};

/// Ordered user/model turns of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ChatHistory {
    contents: Vec<Content>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &[Content] {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Send the whole history plus `msg` under `system_instruction`.
    ///
    /// On success the user turn and the reply are appended; a reply with no
    /// candidates is recorded and returned as `"<empty>"`.  On error, or when
    /// the future is dropped mid-call, the history is unchanged.
    pub async fn send(
        &mut self,
        model: &TextModel,
        system_instruction: Option<&str>,
        msg: &str,
    ) -> Result<String, ProviderError> {
        let user = Content::user(msg);
        let mut request = Vec::with_capacity(self.contents.len() + 1);
        request.extend_from_slice(&self.contents);
        request.push(user.clone());

        let reply = or_empty(model.chat(system_instruction, &request).await?);
        self.contents.push(user);
        self.contents.push(Content::model(reply.clone()));
        Ok(reply)
    }
}
