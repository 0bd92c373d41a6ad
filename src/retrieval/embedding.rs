//! Vertex AI text embeddings (`publishers/google/models/{model}:predict`).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::gcp::GcpContext;
use crate::llm::ProviderError;

#[derive(Debug, Clone)]
pub struct VertexEmbedder {
    gcp: GcpContext,
    url: String,
    task_type: String,
    dimensionality: usize,
}

impl VertexEmbedder {
    pub fn new(gcp: GcpContext, cfg: &EmbeddingConfig) -> Self {
        let url = gcp.aiplatform_url(&format!("publishers/google/models/{}:predict", cfg.model));
        debug!(%url, "embedding endpoint configured");
        Self { gcp, url, task_type: cfg.task_type.clone(), dimensionality: cfg.dimensionality }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbedRequest {
            instances: vec![EmbedInstance { content: text, task_type: &self.task_type }],
            parameters: EmbedParameters { output_dimensionality: self.dimensionality },
        };
        let response: EmbedResponse = self.gcp.post_json(&self.url, &request).await?;
        let vector = single_embedding(response)?;
        debug!(dims = vector.len(), "embedding computed");
        Ok(vector)
    }
}

fn single_embedding(response: EmbedResponse) -> Result<Vec<f32>, ProviderError> {
    if response.predictions.len() != 1 {
        return Err(ProviderError::Unexpected("unexpected number of embeddings".into()));
    }
    let prediction = response.predictions.into_iter().next();
    Ok(prediction
        .map(|p| p.embeddings.values.into_iter().map(|v| v as f32).collect())
        .unwrap_or_default())
}

#[derive(Debug, Serialize)]
struct EmbedInstance<'a> {
    content: &'a str,
    task_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedParameters {
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    instances: Vec<EmbedInstance<'a>>,
    parameters: EmbedParameters,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    embeddings: Embeddings,
}

#[derive(Debug, Deserialize)]
struct Embeddings {
    #[serde(default)]
    values: Vec<f64>,
}
