//! GCE / Cloud Run metadata server client.
//!
//! Used when project, region, or credentials are not given explicitly.
//! Every request carries `Metadata-Flavor: Google`.

use reqwest::Client;
use serde::Deserialize;

use crate::error::AppError;

/// Thin client for `http://metadata.google.internal/computeMetadata/v1`.
#[derive(Debug, Clone)]
pub struct Metadata {
    client: Client,
    base_url: String,
}

/// Reply of `instance/service-accounts/default/token`.
#[derive(Debug, Deserialize)]
pub struct MetadataToken {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Metadata {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, AppError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AppError::Gcp(format!("metadata request {path} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AppError::Gcp(format!(
                "metadata request {path} returned {}",
                response.status()
            )));
        }
        Ok(response)
    }

    async fn get_text(&self, path: &str) -> Result<String, AppError> {
        let text = self
            .get(path)
            .await?
            .text()
            .await
            .map_err(|e| AppError::Gcp(format!("metadata response {path} unreadable: {e}")))?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::Gcp(format!("metadata value {path} is empty")));
        }
        Ok(text)
    }

    /// Project that owns the running instance.
    pub async fn project_id(&self) -> Result<String, AppError> {
        self.get_text("project/project-id").await
    }

    /// Region of the running instance.
    ///
    /// The server answers `projects/<number>/regions/<region>`; only the last
    /// segment is returned.
    pub async fn region(&self) -> Result<String, AppError> {
        let full = self.get_text("instance/region").await?;
        Ok(last_segment(&full).to_string())
    }

    /// Access token of the instance's default service account.
    pub async fn access_token(&self) -> Result<MetadataToken, AppError> {
        self.get("instance/service-accounts/default/token")
            .await?
            .json::<MetadataToken>()
            .await
            .map_err(|e| AppError::Gcp(format!("metadata token malformed: {e}")))
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
