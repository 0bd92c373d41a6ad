//! BigQuery `VECTOR_SEARCH` over the hotel table.
//!
//! Uses the REST `jobs.query` call with the query vector bound as the named
//! `ARRAY<FLOAT64>` parameter `@embeddings`.  When the job does not finish
//! within `timeoutMs`, `jobs.getQueryResults` is long-polled up to
//! `max_poll_attempts` times.  Result pages are followed until exhausted.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::BigQueryConfig;
use crate::gcp::GcpContext;
use crate::llm::ProviderError;
use crate::retrieval::HotelRecord;

#[derive(Debug, Clone)]
pub struct BigQuerySearch {
    gcp: GcpContext,
    sql: String,
    timeout_ms: u64,
    max_poll_attempts: u32,
}

impl BigQuerySearch {
    pub fn new(gcp: GcpContext, cfg: &BigQueryConfig) -> Self {
        Self {
            gcp,
            sql: vector_search_sql(cfg),
            timeout_ms: cfg.timeout_ms,
            max_poll_attempts: cfg.max_poll_attempts,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub async fn search(&self, vector: &[f32]) -> Result<Vec<HotelRecord>, ProviderError> {
        let request = QueryRequest {
            query: &self.sql,
            use_legacy_sql: false,
            parameter_mode: "NAMED",
            timeout_ms: self.timeout_ms,
            query_parameters: vec![QueryParameter::float_array("embeddings", vector)],
        };
        let url = self.gcp.bigquery_url("queries");
        let mut page: QueryResponse = self.gcp.post_json(&url, &request).await?;

        let mut attempts = 0;
        while !page.job_complete {
            if attempts >= self.max_poll_attempts {
                warn!(attempts, "bigquery job still running, giving up");
                return Err(ProviderError::Unexpected(format!(
                    "bigquery job did not complete after {attempts} polls"
                )));
            }
            attempts += 1;
            page = self.get_results(&page, None).await?;
        }

        let mut hotels = Vec::new();
        loop {
            for row in &page.rows {
                hotels.push(row.to_hotel()?);
            }
            match page.page_token.clone() {
                Some(token) => page = self.get_results(&page, Some(token)).await?,
                None => break,
            }
        }
        debug!(matches = hotels.len(), "vector search finished");
        Ok(hotels)
    }

    async fn get_results(&self, prev: &QueryResponse, page_token: Option<String>) -> Result<QueryResponse, ProviderError> {
        let job = prev
            .job_reference
            .as_ref()
            .ok_or_else(|| ProviderError::Decode("query response has no jobReference".into()))?;
        let url = self.gcp.bigquery_url(&format!("queries/{}", job.job_id));
        let mut query = vec![("timeoutMs", self.timeout_ms.to_string())];
        if let Some(location) = &job.location {
            query.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        self.gcp.get_json(&url, &query).await
    }
}

/// The `VECTOR_SEARCH` statement for `cfg`.
pub fn vector_search_sql(cfg: &BigQueryConfig) -> String {
    format!(
        "SELECT base.hotel_name AS hotel_name, \
         base.hotel_address AS hotel_address, \
         base.hotel_description AS hotel_description, \
         base.nearest_attractions AS nearest_attractions \
         FROM VECTOR_SEARCH(TABLE {table}, '{column}', (SELECT @embeddings), \
         top_k => {top_k}, distance_type => '{distance}', \
         options => '{{\"use_brute_force\":{brute}}}');",
        table = cfg.table,
        column = cfg.column,
        top_k = cfg.top_k,
        distance = cfg.distance_type,
        brute = cfg.use_brute_force,
    )
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    parameter_mode: &'a str,
    timeout_ms: u64,
    query_parameters: Vec<QueryParameter>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryParameter {
    name: String,
    parameter_type: ParameterType,
    parameter_value: ParameterValue,
}

impl QueryParameter {
    fn float_array(name: &str, values: &[f32]) -> Self {
        Self {
            name: name.to_string(),
            parameter_type: ParameterType {
                kind: "ARRAY".into(),
                array_type: Some(Box::new(ParameterType { kind: "FLOAT64".into(), array_type: None })),
            },
            parameter_value: ParameterValue {
                array_values: values.iter().map(|v| ScalarValue { value: v.to_string() }).collect(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParameterType {
    #[serde(rename = "type")]
    kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    array_type: Option<Box<ParameterType>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParameterValue {
    array_values: Vec<ScalarValue>,
}

#[derive(Debug, Serialize)]
struct ScalarValue {
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<Row>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: serde_json::Value,
}

impl Row {
    /// Columns in SELECT order: name, address, description, attractions.
    /// NULL cells become empty strings.
    fn to_hotel(&self) -> Result<HotelRecord, ProviderError> {
        if self.f.len() < 4 {
            return Err(ProviderError::Decode(format!("expected 4 columns, got {}", self.f.len())));
        }
        let cell = |i: usize| match &self.f[i].v {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        Ok(HotelRecord { name: cell(0), address: cell(1), description: cell(2), attractions: cell(3) })
    }
}
