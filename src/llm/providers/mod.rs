//! Model backend implementations.
//!
//! `build(config, gcp)` is the factory — called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod gemini;
pub mod prediction;

use crate::config::LlmConfig;
use crate::gcp::GcpContext;
use crate::llm::{ProviderError, TextModel};

/// Construct the configured [`TextModel`].
///
/// `gcp` is `None` when no remote backend is configured; asking for one
/// without it is a configuration error.
pub fn build(config: &LlmConfig, gcp: Option<&GcpContext>) -> Result<TextModel, ProviderError> {
    match config.provider.as_str() {
        "dummy" => Ok(TextModel::Dummy(dummy::DummyProvider::echo())),
        "prediction" => {
            let gcp = require_gcp(gcp)?;
            let endpoint_id = config.prediction.endpoint_id.as_deref().ok_or_else(|| {
                ProviderError::Config("could not retrieve model endpoint ID from environment".into())
            })?;
            Ok(TextModel::Prediction(prediction::PredictionProvider::new(
                gcp.clone(),
                endpoint_id,
                &config.prediction,
            )))
        }
        "gemini" => {
            let gcp = require_gcp(gcp)?;
            Ok(TextModel::Gemini(gemini::GeminiProvider::new(gcp.clone(), &config.gemini.model)))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

pub(crate) fn require_gcp(gcp: Option<&GcpContext>) -> Result<&GcpContext, ProviderError> {
    gcp.ok_or_else(|| ProviderError::Config("google cloud context was not initialised".into()))
}
