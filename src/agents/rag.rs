//! Stateless retrieval-augmented answers: embed → vector search → prompt →
//! model.

use tracing::debug;

use crate::agents::{AgentError, AskInput, AskOutput};
use crate::llm::{ProviderError, TextModel};
use crate::retrieval::{Embedder, HotelRecord, VectorSearch};

const PROMPT_PREAMBLE: [&str; 7] = [
    "Use the following list of hotels for suggestions.",
    "Information about each hotel is JSON record with the following fields:",
    "* name - the name of the hotel",
    "* description - the description of the hotel",
    "* address - the location of the hotel",
    "* attractions - the list of attractions near the hotel",
    "",
];

#[derive(Debug, Clone)]
pub struct RagAgent {
    embedder: Embedder,
    search: VectorSearch,
    model: TextModel,
}

impl RagAgent {
    pub fn new(embedder: Embedder, search: VectorSearch, model: TextModel) -> Self {
        Self { embedder, search, model }
    }

    pub async fn ask(&self, input: AskInput) -> Result<AskOutput, AgentError> {
        let message = self.answer(&input.message).await?;
        Ok(AskOutput { session: None, message })
    }

    pub async fn answer(&self, question: &str) -> Result<String, AgentError> {
        let vector = self.embedder.embed(question).await.map_err(AgentError::Embedding)?;
        let hotels = self.search.search(&vector).await.map_err(AgentError::Retrieval)?;
        debug!(matches = hotels.len(), "hotels retrieved");

        let prompt = build_prompt(question, &hotels).map_err(AgentError::Retrieval)?;
        self.model.complete(&prompt).await.map_err(AgentError::Inference)
    }
}

/// Question, fixed instructions, then one JSON record per line.
pub fn build_prompt(question: &str, hotels: &[HotelRecord]) -> Result<String, ProviderError> {
    let mut lines = Vec::with_capacity(1 + PROMPT_PREAMBLE.len() + hotels.len());
    lines.push(question.to_string());
    lines.extend(PROMPT_PREAMBLE.iter().map(|l| l.to_string()));
    for hotel in hotels {
        lines.push(serde_json::to_string(hotel).map_err(|e| ProviderError::Decode(e.to_string()))?);
    }
    Ok(lines.join("\n"))
}
