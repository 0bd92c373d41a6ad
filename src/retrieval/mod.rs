//! Retrieval: turn a question into an embedding and find matching hotels.
//!
//! Both halves are enums over concrete backends, built once at startup by
//! [`build_embedder`] and [`build_search`].  The `Dummy` and `Static`
//! variants need no cloud access and back local runs and tests.

pub mod bigquery;
pub mod embedding;

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::gcp::GcpContext;
use crate::llm::ProviderError;
use crate::llm::providers::require_gcp;

/// One vector-search match.  Serialises with the keys in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelRecord {
    pub name: String,
    pub address: String,
    pub description: String,
    pub attractions: String,
}

// ── Embedder ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Embedder {
    /// Deterministic pseudo-embedding of the given dimensionality.
    Dummy(usize),
    Vertex(embedding::VertexEmbedder),
}

impl Embedder {
    pub fn name(&self) -> &'static str {
        match self {
            Embedder::Dummy(_) => "dummy",
            Embedder::Vertex(_) => "vertex",
        }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        match self {
            Embedder::Dummy(dims) => Ok(dummy_embedding(text, *dims)),
            Embedder::Vertex(e) => e.embed(text).await,
        }
    }
}

/// Byte histogram folded into `dims` buckets, L2-normalised.
fn dummy_embedding(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0f32; dims];
    if dims == 0 {
        return v;
    }
    for (i, b) in text.bytes().enumerate() {
        v[(i + b as usize) % dims] += f32::from(b) / 255.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

pub fn build_embedder(cfg: &EmbeddingConfig, gcp: Option<&GcpContext>) -> Result<Embedder, ProviderError> {
    match cfg.provider.as_str() {
        "dummy" => Ok(Embedder::Dummy(cfg.dimensionality)),
        "vertex" => Ok(Embedder::Vertex(embedding::VertexEmbedder::new(require_gcp(gcp)?.clone(), cfg))),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

// ── Vector search ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum VectorSearch {
    /// First `top_k` entries of a fixed list, unranked.
    Static { records: Vec<HotelRecord>, top_k: usize },
    BigQuery(bigquery::BigQuerySearch),
}

impl VectorSearch {
    pub fn name(&self) -> &'static str {
        match self {
            VectorSearch::Static { .. } => "static",
            VectorSearch::BigQuery(_) => "bigquery",
        }
    }

    pub async fn search(&self, vector: &[f32]) -> Result<Vec<HotelRecord>, ProviderError> {
        match self {
            VectorSearch::Static { records, top_k } => Ok(records.iter().take(*top_k).cloned().collect()),
            VectorSearch::BigQuery(bq) => bq.search(vector).await,
        }
    }
}

pub fn build_search(cfg: &RetrievalConfig, gcp: Option<&GcpContext>) -> Result<VectorSearch, ProviderError> {
    match cfg.provider.as_str() {
        "static" => {
            let records = match &cfg.static_records.records_path {
                Some(path) => load_records(path)?,
                None => sample_records(),
            };
            Ok(VectorSearch::Static { records, top_k: cfg.static_records.top_k })
        }
        "bigquery" => Ok(VectorSearch::BigQuery(bigquery::BigQuerySearch::new(
            require_gcp(gcp)?.clone(),
            &cfg.bigquery,
        ))),
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

/// Read a JSON array of [`HotelRecord`]s.
pub fn load_records(path: &Path) -> Result<Vec<HotelRecord>, ProviderError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| ProviderError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| ProviderError::Config(format!("invalid hotel records in {}: {e}", path.display())))
}

fn sample_records() -> Vec<HotelRecord> {
    let hotel = |name: &str, address: &str, description: &str, attractions: &str| HotelRecord {
        name: name.into(),
        address: address.into(),
        description: description.into(),
        attractions: attractions.into(),
    };
    vec![
        hotel(
            "Harborlight Inn",
            "12 Pier Street, Seattle, WA",
            "Small waterfront inn with harbor views and a rooftop terrace.",
            "Pike Place Market, Seattle Aquarium, Waterfront Park",
        ),
        hotel(
            "Cedar Ridge Lodge",
            "400 Mountain Loop Hwy, Granite Falls, WA",
            "Rustic lodge at the edge of the forest with hiking trails from the door.",
            "Mount Pilchuck, Big Four Ice Caves",
        ),
        hotel(
            "The Lantern House",
            "88 Market Avenue, Portland, OR",
            "Boutique hotel in a restored warehouse near the old town.",
            "Lan Su Chinese Garden, Powell's City of Books",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentKind, Config};
    use std::io::Write;

    #[tokio::test]
    async fn dummy_embedding_is_deterministic_and_sized() {
        let e = Embedder::Dummy(8);
        let a = e.embed("quiet place near the sea").await.unwrap();
        let b = e.embed("quiet place near the sea").await.unwrap();
        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
        assert_ne!(a, e.embed("something else").await.unwrap());
    }

    #[test]
    fn dummy_embedding_of_empty_text_is_zero() {
        assert!(dummy_embedding("", 4).iter().all(|x| *x == 0.0));
    }

    #[test]
    fn hotel_json_key_order() {
        let h = HotelRecord { name: "n".into(), address: "a".into(), description: "d".into(), attractions: "t".into() };
        assert_eq!(
            serde_json::to_string(&h).unwrap(),
            r#"{"name":"n","address":"a","description":"d","attractions":"t"}"#
        );
    }

    #[tokio::test]
    async fn static_search_truncates_to_top_k() {
        let search = VectorSearch::Static { records: sample_records(), top_k: 2 };
        let hits = search.search(&[]).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name, "Harborlight Inn");
    }

    #[test]
    fn static_records_load_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"[{{"name":"A","address":"B","description":"C","attractions":"D"}}]"#).unwrap();
        let mut cfg = Config::test_default(AgentKind::Rag).unwrap().retrieval;
        cfg.static_records.records_path = Some(f.path().to_path_buf());
        match build_search(&cfg, None).unwrap() {
            VectorSearch::Static { records, .. } => assert_eq!(records[0].name, "A"),
            other => panic!("unexpected backend {}", other.name()),
        }
    }

    #[test]
    fn bad_records_file_is_config_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        assert!(matches!(load_records(f.path()), Err(ProviderError::Config(_))));
    }

    #[test]
    fn cloud_backends_require_gcp() {
        let cfg = Config::test_default(AgentKind::Rag).unwrap();
        let mut emb = cfg.embedding.clone();
        emb.provider = "vertex".into();
        assert!(build_embedder(&emb, None).is_err());
        let mut ret = cfg.retrieval.clone();
        ret.provider = "bigquery".into();
        assert!(build_search(&ret, None).is_err());
    }
}
