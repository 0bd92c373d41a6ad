//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the file named by `ASK_BOT_CONFIG`)
//! relative to the current working directory, then applies the environment
//! overrides collected in [`EnvOverrides`].  Secrets (the access token) are
//! only ever read from the environment.

use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;

use crate::error::AppError;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ── Resolved types ────────────────────────────────────────────────────────────

/// Which agent answers `POST /ask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// Raw-prompt model behind a custom prediction endpoint, turn-marker history.
    TurnChat,
    /// Gemini with structured history and hot-reloadable system instructions.
    GeminiChat,
    /// Stateless embed → vector search → Gemini.
    Rag,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::TurnChat => "turn_chat",
            AgentKind::GeminiChat => "gemini_chat",
            AgentKind::Rag => "rag",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "turn_chat" | "gemma" => Ok(AgentKind::TurnChat),
            "gemini_chat" | "gemini" => Ok(AgentKind::GeminiChat),
            "rag" => Ok(AgentKind::Rag),
            other => Err(AppError::Config(format!("unknown agent kind: '{other}'"))),
        }
    }
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!("unknown log format: '{other}'"))),
        }
    }
}

/// HTTP channel configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind to.
    pub bind: String,
    /// Directory served for non-API GET paths; `None` disables static serving.
    pub static_dir: Option<PathBuf>,
    /// Upper bound on a single `/ask` round-trip.
    pub request_timeout_seconds: u64,
    /// Per-request trace logging (`DO_DEBUG`).
    pub http_trace: bool,
}

/// Google Cloud project, location, and endpoint bases.
#[derive(Debug, Clone)]
pub struct GcpConfig {
    /// `None` means "ask the metadata server".
    pub project_id: Option<String>,
    /// `None` means "ask the metadata server".
    pub region: Option<String>,
    /// Per-request HTTP timeout in seconds for all Google API calls.
    pub timeout_seconds: u64,
    /// Override for `https://{region}-aiplatform.googleapis.com/v1`.
    pub aiplatform_base_url: Option<String>,
    pub bigquery_base_url: String,
    pub metadata_base_url: String,
    /// Bearer token from `GOOGLE_ACCESS_TOKEN`.  Never sourced from TOML.
    pub access_token: Option<String>,
}

/// Custom prediction endpoint parameters (`[llm.prediction]`).
#[derive(Debug, Clone)]
pub struct PredictionConfig {
    pub endpoint_id: Option<String>,
    pub raw: bool,
    pub temperature: f32,
    pub max_input_tokens: u32,
    pub max_output_tokens: u32,
}

/// Gemini model selection (`[llm.gemini]`).
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub model: String,
}

/// LLM backend configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Active backend: `"dummy"`, `"prediction"`, or `"gemini"`.
    pub provider: String,
    pub prediction: PredictionConfig,
    pub gemini: GeminiConfig,
}

/// Embedding backend configuration.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// `"dummy"` or `"vertex"`.
    pub provider: String,
    pub model: String,
    pub dimensionality: usize,
    pub task_type: String,
}

/// BigQuery `VECTOR_SEARCH` parameters.
#[derive(Debug, Clone)]
pub struct BigQueryConfig {
    pub table: String,
    pub column: String,
    pub top_k: usize,
    pub distance_type: String,
    pub use_brute_force: bool,
    /// Server-side wait per `jobs.query` / `getQueryResults` call.
    pub timeout_ms: u64,
    /// How many `getQueryResults` calls to make before giving up on a job.
    pub max_poll_attempts: u32,
}

/// Fixed-list retrieval, for local runs without BigQuery.
#[derive(Debug, Clone)]
pub struct StaticRecordsConfig {
    pub records_path: Option<PathBuf>,
    pub top_k: usize,
}

/// Retrieval backend configuration.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// `"bigquery"` or `"static"`.
    pub provider: String,
    pub bigquery: BigQueryConfig,
    pub static_records: StaticRecordsConfig,
}

/// System-instruction file and reload cadence.
#[derive(Debug, Clone)]
pub struct InstructionsConfig {
    /// Base directory; the file lives at `{dir}/{file}`.
    pub dir: Option<PathBuf>,
    pub file: String,
    pub poll_seconds: u64,
}

impl InstructionsConfig {
    /// Full path of the instruction file, when a directory is configured.
    pub fn path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(&self.file))
    }
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub agent: AgentKind,
    pub server: ServerConfig,
    pub gcp: GcpConfig,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub instructions: InstructionsConfig,
}

// ── Environment overrides ─────────────────────────────────────────────────────

/// Environment values that take precedence over the TOML file.
///
/// Collected once by [`EnvOverrides::from_env`]; tests build it directly
/// instead of mutating process env.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub log_level: Option<String>,
    pub port: Option<String>,
    pub debug: bool,
    pub agent: Option<String>,
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub endpoint_id: Option<String>,
    pub gemini_model: Option<String>,
    pub genai_model: Option<String>,
    pub embedding_model: Option<String>,
    pub instruction_dir: Option<String>,
    pub access_token: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            log_level: non_empty_var("ASK_BOT_LOG_LEVEL"),
            port: non_empty_var("PORT"),
            debug: non_empty_var("DO_DEBUG").is_some(),
            agent: non_empty_var("AGENT_KIND"),
            project_id: non_empty_var("PROJECT_ID").or_else(|| non_empty_var("GOOGLE_CLOUD_PROJECT")),
            region: non_empty_var("REGION_NAME"),
            endpoint_id: non_empty_var("ENDPOINT_ID"),
            gemini_model: non_empty_var("GEMINI_MODEL_NAME"),
            genai_model: non_empty_var("GENAI_MODEL"),
            embedding_model: non_empty_var("EMBEDDING_MODEL"),
            instruction_dir: non_empty_var("SYS_INSTRUCTION_PATH"),
            access_token: non_empty_var("GOOGLE_ACCESS_TOKEN"),
        }
    }
}

/// Empty values count as unset.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    service: RawService,
    #[serde(default)]
    server: RawServer,
    #[serde(default)]
    gcp: RawGcp,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    embedding: RawEmbedding,
    #[serde(default)]
    retrieval: RawRetrieval,
    #[serde(default)]
    instructions: RawInstructions,
}

#[derive(Deserialize)]
struct RawService {
    #[serde(default = "default_agent")]
    agent: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_log_format")]
    log_format: String,
}

impl Default for RawService {
    fn default() -> Self {
        Self {
            agent: default_agent(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_static_dir")]
    static_dir: Option<String>,
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
    #[serde(default)]
    http_trace: bool,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            static_dir: default_static_dir(),
            request_timeout_seconds: default_request_timeout_seconds(),
            http_trace: false,
        }
    }
}

#[derive(Deserialize)]
struct RawGcp {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default = "default_gcp_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default)]
    aiplatform_base_url: Option<String>,
    #[serde(default = "default_bigquery_base_url")]
    bigquery_base_url: String,
    #[serde(default = "default_metadata_base_url")]
    metadata_base_url: String,
}

impl Default for RawGcp {
    fn default() -> Self {
        Self {
            project_id: None,
            region: None,
            timeout_seconds: default_gcp_timeout_seconds(),
            aiplatform_base_url: None,
            bigquery_base_url: default_bigquery_base_url(),
            metadata_base_url: default_metadata_base_url(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    /// Maps to `default = "..."` in `[llm]`.
    #[serde(rename = "default", default = "default_llm_provider")]
    provider: String,
    #[serde(default)]
    prediction: RawPrediction,
    #[serde(default)]
    gemini: RawGemini,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            prediction: RawPrediction::default(),
            gemini: RawGemini::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawPrediction {
    #[serde(default)]
    endpoint_id: Option<String>,
    #[serde(default = "default_true")]
    raw: bool,
    #[serde(default = "default_prediction_temperature")]
    temperature: f32,
    #[serde(default = "default_max_input_tokens")]
    max_input_tokens: u32,
    #[serde(default = "default_max_output_tokens")]
    max_output_tokens: u32,
}

impl Default for RawPrediction {
    fn default() -> Self {
        Self {
            endpoint_id: None,
            raw: true,
            temperature: default_prediction_temperature(),
            max_input_tokens: default_max_input_tokens(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

#[derive(Deserialize)]
struct RawGemini {
    #[serde(default = "default_gemini_model")]
    model: String,
}

impl Default for RawGemini {
    fn default() -> Self {
        Self { model: default_gemini_model() }
    }
}

#[derive(Deserialize)]
struct RawEmbedding {
    #[serde(rename = "default", default = "default_embedding_provider")]
    provider: String,
    #[serde(default = "default_embedding_model")]
    model: String,
    #[serde(default = "default_dimensionality")]
    dimensionality: usize,
    #[serde(default = "default_task_type")]
    task_type: String,
}

impl Default for RawEmbedding {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dimensionality: default_dimensionality(),
            task_type: default_task_type(),
        }
    }
}

#[derive(Deserialize)]
struct RawRetrieval {
    #[serde(rename = "default", default = "default_retrieval_provider")]
    provider: String,
    #[serde(default)]
    bigquery: RawBigQuery,
    #[serde(default, rename = "static")]
    static_records: RawStaticRecords,
}

impl Default for RawRetrieval {
    fn default() -> Self {
        Self {
            provider: default_retrieval_provider(),
            bigquery: RawBigQuery::default(),
            static_records: RawStaticRecords::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawBigQuery {
    #[serde(default = "default_bq_table")]
    table: String,
    #[serde(default = "default_bq_column")]
    column: String,
    #[serde(default = "default_top_k")]
    top_k: usize,
    #[serde(default = "default_distance_type")]
    distance_type: String,
    #[serde(default = "default_true")]
    use_brute_force: bool,
    #[serde(default = "default_bq_timeout_ms")]
    timeout_ms: u64,
    #[serde(default = "default_bq_poll_attempts")]
    max_poll_attempts: u32,
}

impl Default for RawBigQuery {
    fn default() -> Self {
        Self {
            table: default_bq_table(),
            column: default_bq_column(),
            top_k: default_top_k(),
            distance_type: default_distance_type(),
            use_brute_force: true,
            timeout_ms: default_bq_timeout_ms(),
            max_poll_attempts: default_bq_poll_attempts(),
        }
    }
}

#[derive(Deserialize)]
struct RawStaticRecords {
    #[serde(default)]
    records_path: Option<String>,
    #[serde(default = "default_top_k")]
    top_k: usize,
}

impl Default for RawStaticRecords {
    fn default() -> Self {
        Self { records_path: None, top_k: default_top_k() }
    }
}

#[derive(Deserialize)]
struct RawInstructions {
    #[serde(default)]
    dir: Option<String>,
    #[serde(default = "default_instruction_file")]
    file: String,
    #[serde(default = "default_poll_seconds")]
    poll_seconds: u64,
}

impl Default for RawInstructions {
    fn default() -> Self {
        Self {
            dir: None,
            file: default_instruction_file(),
            poll_seconds: default_poll_seconds(),
        }
    }
}

fn default_agent() -> String { "gemini_chat".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
fn default_bind() -> String { "0.0.0.0:8080".to_string() }
fn default_static_dir() -> Option<String> { Some("web/static".to_string()) }
fn default_request_timeout_seconds() -> u64 { 120 }
fn default_gcp_timeout_seconds() -> u64 { 60 }
fn default_bigquery_base_url() -> String { "https://bigquery.googleapis.com/bigquery/v2".to_string() }
fn default_metadata_base_url() -> String { "http://metadata.google.internal/computeMetadata/v1".to_string() }
fn default_llm_provider() -> String { "dummy".to_string() }
fn default_prediction_temperature() -> f32 { 0.8 }
fn default_max_input_tokens() -> u32 { 2048 }
fn default_max_output_tokens() -> u32 { 256 }
fn default_gemini_model() -> String { "gemini-1.5-flash-001".to_string() }
fn default_embedding_provider() -> String { "dummy".to_string() }
fn default_embedding_model() -> String { "text-embedding-004".to_string() }
fn default_dimensionality() -> usize { 768 }
fn default_task_type() -> String { "QUESTION_ANSWERING".to_string() }
fn default_retrieval_provider() -> String { "static".to_string() }
fn default_bq_table() -> String { "genai_upskilling.hotels_fictional_data".to_string() }
fn default_bq_column() -> String { "embeddings".to_string() }
fn default_top_k() -> usize { 5 }
fn default_distance_type() -> String { "COSINE".to_string() }
fn default_bq_timeout_ms() -> u64 { 10_000 }
fn default_bq_poll_attempts() -> u32 { 5 }
fn default_instruction_file() -> String { "current/system_instructions.txt".to_string() }
fn default_poll_seconds() -> u64 { 5 }

fn default_true() -> bool {
    true
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load config from `ASK_BOT_CONFIG` (default `config/default.toml`), then
/// apply env-var overrides.
pub fn load() -> Result<Config, AppError> {
    let path = non_empty_var("ASK_BOT_CONFIG").unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    load_from(Path::new(&path), &EnvOverrides::from_env())
}

/// Internal loader — accepts an explicit path and overrides.
pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_str(&raw, overrides)
        .map_err(|e| AppError::Config(format!("{} ({})", strip_prefix(&e), path.display())))
}

/// Parse TOML text and resolve it against `overrides`.
pub fn parse_str(text: &str, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(text).map_err(|e| AppError::Config(format!("parse error: {e}")))?;
    resolve(parsed, overrides)
}

fn strip_prefix(e: &AppError) -> String {
    match e {
        AppError::Config(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn resolve(parsed: RawConfig, o: &EnvOverrides) -> Result<Config, AppError> {
    let agent: AgentKind = o.agent.as_deref().unwrap_or(&parsed.service.agent).parse()?;
    let log_format: LogFormat = parsed.service.log_format.parse()?;
    let log_level = o.log_level.clone().unwrap_or(parsed.service.log_level);

    let bind = match &o.port {
        Some(port) => {
            port.parse::<u16>()
                .map_err(|_| AppError::Config(format!("invalid PORT: '{port}'")))?;
            format!("0.0.0.0:{port}")
        }
        None => parsed.server.bind,
    };

    // The chat service historically read GEMINI_MODEL_NAME and the RAG
    // service GENAI_MODEL; each prefers its own and accepts the other.
    let gemini_model = match agent {
        AgentKind::Rag => o.genai_model.clone().or_else(|| o.gemini_model.clone()),
        _ => o.gemini_model.clone().or_else(|| o.genai_model.clone()),
    }
    .unwrap_or(parsed.llm.gemini.model);

    let instruction_dir = o
        .instruction_dir
        .clone()
        .or(parsed.instructions.dir)
        .map(|d| expand_home(&d));

    let p = parsed.llm.prediction;
    let bq = parsed.retrieval.bigquery;

    Ok(Config {
        log_level,
        log_format,
        agent,
        server: ServerConfig {
            bind,
            static_dir: parsed.server.static_dir.filter(|d| !d.is_empty()).map(|d| expand_home(&d)),
            request_timeout_seconds: parsed.server.request_timeout_seconds,
            http_trace: parsed.server.http_trace || o.debug,
        },
        gcp: GcpConfig {
            project_id: o.project_id.clone().or(parsed.gcp.project_id).filter(|s| !s.is_empty()),
            region: o.region.clone().or(parsed.gcp.region).filter(|s| !s.is_empty()),
            timeout_seconds: parsed.gcp.timeout_seconds,
            aiplatform_base_url: parsed.gcp.aiplatform_base_url,
            bigquery_base_url: parsed.gcp.bigquery_base_url,
            metadata_base_url: parsed.gcp.metadata_base_url,
            access_token: o.access_token.clone(),
        },
        llm: LlmConfig {
            provider: parsed.llm.provider,
            prediction: PredictionConfig {
                endpoint_id: o.endpoint_id.clone().or(p.endpoint_id).filter(|s| !s.is_empty()),
                raw: p.raw,
                temperature: p.temperature,
                max_input_tokens: p.max_input_tokens,
                max_output_tokens: p.max_output_tokens,
            },
            gemini: GeminiConfig { model: gemini_model },
        },
        embedding: EmbeddingConfig {
            provider: parsed.embedding.provider,
            model: o.embedding_model.clone().unwrap_or(parsed.embedding.model),
            dimensionality: parsed.embedding.dimensionality,
            task_type: parsed.embedding.task_type,
        },
        retrieval: RetrievalConfig {
            provider: parsed.retrieval.provider,
            bigquery: BigQueryConfig {
                table: bq.table,
                column: bq.column,
                top_k: bq.top_k,
                distance_type: bq.distance_type,
                use_brute_force: bq.use_brute_force,
                timeout_ms: bq.timeout_ms,
                max_poll_attempts: bq.max_poll_attempts,
            },
            static_records: StaticRecordsConfig {
                records_path: parsed.retrieval.static_records.records_path.map(|p| expand_home(&p)),
                top_k: parsed.retrieval.static_records.top_k,
            },
        },
        instructions: InstructionsConfig {
            dir: instruction_dir,
            file: parsed.instructions.file,
            poll_seconds: parsed.instructions.poll_seconds.max(1),
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

impl Config {
    /// Offline `Config` — dummy backends, no project, no external calls.
    #[doc(hidden)]
    pub fn test_default(agent: AgentKind) -> Result<Self, AppError> {
        let mut cfg = parse_str("", &EnvOverrides::default())?;
        cfg.agent = agent;
        cfg.server.bind = "127.0.0.1:0".into();
        cfg.server.static_dir = None;
        cfg.gcp.project_id = Some("test-project".into());
        cfg.gcp.region = Some("us-central1".into());
        cfg.gcp.timeout_seconds = 5;
        cfg.gcp.access_token = Some("test-token".into());
        cfg.embedding.dimensionality = 8;
        Ok(cfg)
    }
}
