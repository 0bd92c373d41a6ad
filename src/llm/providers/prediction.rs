//! Custom Vertex AI prediction endpoint (`endpoints/{id}:predict`).
//!
//! Serves models deployed from Model Garden that take one raw prompt
//! string (`{"inputs": ...}`) and answer with one generated string.  The
//! caller owns prompt templating; see `crate::chat::turns`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PredictionConfig;
use crate::gcp::GcpContext;
use crate::llm::ProviderError;

#[derive(Debug, Clone)]
pub struct PredictionProvider {
    gcp: GcpContext,
    url: String,
    parameters: Parameters,
}

impl PredictionProvider {
    pub fn new(gcp: GcpContext, endpoint_id: &str, cfg: &PredictionConfig) -> Self {
        let url = gcp.aiplatform_url(&format!("endpoints/{endpoint_id}:predict"));
        debug!(%url, "prediction endpoint configured");
        Self {
            gcp,
            url,
            parameters: Parameters {
                raw: cfg.raw,
                temperature: cfg.temperature,
                max_input_tokens: cfg.max_input_tokens,
                max_output_tokens: cfg.max_output_tokens,
            },
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn complete(&self, prompt: &str) -> Result<String, ProviderError> {
        let request = PredictRequest {
            instances: vec![Instance { inputs: prompt }],
            parameters: &self.parameters,
        };
        debug!(url = %self.url, prompt_len = prompt.len(), "prompting model");

        let response: PredictResponse = self
            .gcp
            .post_json(&self.url, &request)
            .await
            .map_err(|e| ProviderError::NoResponse(e.to_string()))?;
        first_prediction(response)
    }
}

fn first_prediction(response: PredictResponse) -> Result<String, ProviderError> {
    match response.predictions.into_iter().next() {
        None => Err(ProviderError::EmptyResponse("model returned empty response".into())),
        Some(serde_json::Value::String(text)) => Ok(text),
        Some(other) => Err(ProviderError::Decode(format!("prediction is not a string: {other}"))),
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters {
    raw: bool,
    temperature: f32,
    max_input_tokens: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Instance<'a> {
    inputs: &'a str,
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance<'a>>,
    parameters: &'a Parameters,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<serde_json::Value>,
}
