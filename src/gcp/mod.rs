//! Google Cloud plumbing shared by every remote backend.
//!
//! [`GcpContext`] carries the resolved project and region, one pooled
//! `reqwest::Client`, and the bearer-token source.  It is built once at
//! startup (only when a non-dummy backend is configured) and cloned into
//! each provider; all fields are reference-counted.

pub mod metadata;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

use crate::config::GcpConfig;
use crate::error::AppError;
use crate::llm::ProviderError;

pub use metadata::Metadata;

/// Refresh metadata-server tokens this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// ── Token source ──────────────────────────────────────────────────────────────

/// A metadata-server token and the instant it stops being valid.
#[derive(Debug)]
pub struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Where bearer tokens come from.
#[derive(Debug, Clone)]
pub enum TokenSource {
    /// Fixed token from `GOOGLE_ACCESS_TOKEN`.
    Static(String),
    /// Default service account of the GCE / Cloud Run instance.
    Metadata {
        metadata: Metadata,
        cached: Arc<Mutex<Option<CachedToken>>>,
    },
}

impl TokenSource {
    pub fn metadata(metadata: Metadata) -> Self {
        TokenSource::Metadata { metadata, cached: Arc::new(Mutex::new(None)) }
    }

    /// Current access token, fetching a new one from the metadata server
    /// when the cached token is missing or about to expire.
    pub async fn token(&self) -> Result<String, ProviderError> {
        match self {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::Metadata { metadata, cached } => {
                let mut guard = cached.lock().await;
                if let Some(tok) = guard.as_ref() {
                    if tok.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                        return Ok(tok.value.clone());
                    }
                }
                let fresh = metadata
                    .access_token()
                    .await
                    .map_err(|e| ProviderError::Auth(e.to_string()))?;
                debug!(expires_in = fresh.expires_in, "access token refreshed");
                let value = fresh.access_token.clone();
                *guard = Some(CachedToken {
                    value: fresh.access_token,
                    expires_at: Instant::now() + Duration::from_secs(fresh.expires_in),
                });
                Ok(value)
            }
        }
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// Resolved project/region plus authenticated JSON transport.
#[derive(Debug, Clone)]
pub struct GcpContext {
    project_id: String,
    region: String,
    aiplatform_base_url: String,
    bigquery_base_url: String,
    client: Client,
    tokens: TokenSource,
}

impl GcpContext {
    /// Resolve project and region (config/env first, metadata server
    /// second) and set up the token source.
    pub async fn resolve(cfg: &GcpConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()
            .map_err(|e| AppError::Gcp(format!("failed to build HTTP client: {e}")))?;
        let metadata = Metadata::new(client.clone(), cfg.metadata_base_url.clone());

        let project_id = match &cfg.project_id {
            Some(p) => p.clone(),
            None => metadata
                .project_id()
                .await
                .map_err(|e| AppError::Gcp(format!("could not retrieve current project ID: {e}")))?,
        };
        let region = match &cfg.region {
            Some(r) => r.clone(),
            None => metadata
                .region()
                .await
                .map_err(|e| AppError::Gcp(format!("could not retrieve current region: {e}")))?,
        };
        let tokens = match &cfg.access_token {
            Some(t) => TokenSource::Static(t.clone()),
            None => TokenSource::metadata(metadata),
        };

        Ok(Self::new(client, project_id, region, cfg, tokens))
    }

    /// Assemble a context from already-known parts.
    pub fn new(client: Client, project_id: String, region: String, cfg: &GcpConfig, tokens: TokenSource) -> Self {
        let aiplatform_base_url = cfg
            .aiplatform_base_url
            .clone()
            .unwrap_or_else(|| format!("https://{region}-aiplatform.googleapis.com/v1"));
        Self {
            project_id,
            region,
            aiplatform_base_url: aiplatform_base_url.trim_end_matches('/').to_string(),
            bigquery_base_url: cfg.bigquery_base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// `{base}/projects/{project}/locations/{region}/{resource}`.
    pub fn aiplatform_url(&self, resource: &str) -> String {
        format!(
            "{}/projects/{}/locations/{}/{}",
            self.aiplatform_base_url, self.project_id, self.region, resource
        )
    }

    /// `{base}/projects/{project}/{resource}`.
    pub fn bigquery_url(&self, resource: &str) -> String {
        format!("{}/projects/{}/{}", self.bigquery_base_url, self.project_id, resource)
    }

    /// Authenticated `POST` with a JSON body, decoding a JSON reply.
    pub async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        if tracing::enabled!(tracing::Level::TRACE) {
            let json = serde_json::to_string(body).unwrap_or_else(|e| format!("<serialization failed: {e}>"));
            trace!(%url, payload = %json, "google api request");
        }
        let token = self.tokens.token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "google api request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;
        decode(check_status(response).await?).await
    }

    /// Authenticated `GET` with query parameters, decoding a JSON reply.
    pub async fn get_json<R>(&self, url: &str, query: &[(&str, String)]) -> Result<R, ProviderError>
    where
        R: DeserializeOwned,
    {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!(%url, error = %e, "google api request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;
        decode(check_status(response).await?).await
    }
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, ProviderError> {
    response.json::<R>().await.map_err(|e| {
        error!(error = %e, "failed to deserialize google api response");
        ProviderError::Decode(e.to_string())
    })
}

// Google API error envelope: `{"error": {"code": 404, "message": "...", "status": "NOT_FOUND"}}`.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Pass successful responses through; turn anything else into a
/// [`ProviderError::Status`] carrying the API's own message when present.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(env) => match env.error.status {
            Some(s) => format!("{s}: {}", env.error.message),
            None => env.error.message,
        },
        Err(_) => body,
    };

    error!(%status, %message, "google api returned HTTP error");
    Err(ProviderError::Status { status: status.as_u16(), message })
}
