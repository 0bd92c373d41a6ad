//! Gemini on Vertex AI (`publishers/google/models/{model}:generateContent`).
//!
//! Stateless: every call carries the full conversation and the current
//! system instruction.  All wire types are private to this module.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::response::join_parts;
use crate::gcp::GcpContext;
use crate::llm::{Content, ProviderError, Role};

#[derive(Debug, Clone)]
pub struct GeminiProvider {
    gcp: GcpContext,
    model: String,
    url: String,
}

impl GeminiProvider {
    pub fn new(gcp: GcpContext, model: impl Into<String>) -> Self {
        let model = model.into();
        let url = gcp.aiplatform_url(&format!("publishers/google/models/{model}:generateContent"));
        Self { gcp, model, url }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One-shot prompt.  A reply without candidates is an error here.
    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        self.generate(None, &[Content::user(prompt)])
            .await?
            .ok_or_else(|| ProviderError::EmptyResponse("model has no answer".into()))
    }

    /// Send `contents` and return the first candidate's text, or `None`
    /// when the model returned no candidates.
    pub async fn generate(&self, system: Option<&str>, contents: &[Content]) -> Result<Option<String>, ProviderError> {
        let request = GenerateRequest {
            contents: contents.iter().map(WireContent::from).collect(),
            system_instruction: system.filter(|s| !s.is_empty()).map(|text| SystemInstruction {
                parts: vec![WirePart { text }],
            }),
        };
        debug!(model = %self.model, turns = contents.len(), "sending generateContent request");

        let response: GenerateResponse = self.gcp.post_json(&self.url, &request).await?;
        let text = first_candidate_text(response);
        debug!(model = %self.model, has_candidate = text.is_some(), "received generateContent response");
        Ok(text)
    }
}

fn first_candidate_text(response: GenerateResponse) -> Option<String> {
    let candidate = response.candidates.into_iter().next()?;
    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    Some(join_parts(parts.iter().filter_map(|p| p.text.as_deref())))
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WirePart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    role: Role,
    parts: Vec<WirePart<'a>>,
}

impl<'a> From<&'a Content> for WireContent<'a> {
    fn from(c: &'a Content) -> Self {
        Self { role: c.role, parts: vec![WirePart { text: &c.text }] }
    }
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<WireContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction<'a>>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_shape_matches_api() {
        let contents = [Content::user("is a pizza box recyclable?"), Content::model("yes")];
        let req = GenerateRequest {
            contents: contents.iter().map(WireContent::from).collect(),
            system_instruction: Some(SystemInstruction { parts: vec![WirePart { text: "be brief" }] }),
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][1]["role"], "model");
        assert_eq!(v["contents"][1]["parts"][0]["text"], "yes");
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "be brief");
    }

    #[test]
    fn system_instruction_omitted_when_absent() {
        let req = GenerateRequest { contents: vec![], system_instruction: None };
        let v = serde_json::to_value(&req).unwrap();
        assert!(v.get("systemInstruction").is_none());
    }

    #[test]
    fn parts_joined_from_first_candidate() {
        let r: GenerateResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "Blue cart"}, {"text": ""}, {"text": "rinse first"}]}},
                {"content": {"role": "model", "parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(first_candidate_text(r).as_deref(), Some("Blue cart. rinse first"));
    }

    #[test]
    fn no_candidates_is_none() {
        let r: GenerateResponse = serde_json::from_value(json!({"candidates": []})).unwrap();
        assert_eq!(first_candidate_text(r), None);
        let r: GenerateResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(first_candidate_text(r), None);
    }

    #[test]
    fn candidate_without_content_is_empty_text() {
        let r: GenerateResponse =
            serde_json::from_value(json!({"candidates": [{"finishReason": "SAFETY"}]})).unwrap();
        assert_eq!(first_candidate_text(r).as_deref(), Some(""));
    }
}
