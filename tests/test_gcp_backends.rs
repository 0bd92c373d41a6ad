//! Remote backends against a local mock of the Vertex AI, BigQuery, and
//! metadata-server REST APIs.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ask_bot::agents::{self, Agent, AskInput};
use ask_bot::config::{AgentKind, Config};
use ask_bot::gcp::{GcpContext, TokenSource};
use ask_bot::retrieval::bigquery::BigQuerySearch;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    query: String,
    auth: Option<String>,
    body: Value,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

const HOTEL_ROW: &str = r#"{"f": [{"v": "Harborlight Inn"}, {"v": "12 Pier Street"}, {"v": "Waterfront inn"}, {"v": "Aquarium"}]}"#;

fn hotel_row(name: &str) -> Value {
    json!({"f": [{"v": name}, {"v": "1 Main Street"}, {"v": null}, {"v": "Park"}]})
}

async fn mock(State(log): State<Log>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let path = uri.path().to_string();
    log.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: path.clone(),
        query: uri.query().unwrap_or_default().to_string(),
        auth: headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_string),
        body: serde_json::from_slice(&body).unwrap_or(Value::Null),
    });

    if let Some((prefix, resource)) = path.split_once("/computeMetadata/v1/") {
        if headers.get("metadata-flavor").map(|v| v.as_bytes()) != Some(b"Google".as_slice()) {
            return StatusCode::FORBIDDEN.into_response();
        }
        // Tokens served under `/short-lived` expire inside the refresh margin.
        let expires_in = if prefix == "/short-lived" { 30 } else { 3599 };
        return match resource {
            "project/project-id" => "meta-project".into_response(),
            "instance/region" => "projects/123456/regions/europe-west1".into_response(),
            "instance/service-accounts/default/token" => {
                axum::Json(json!({"access_token": "meta-token", "expires_in": expires_in, "token_type": "Bearer"}))
                    .into_response()
            }
            _ => StatusCode::NOT_FOUND.into_response(),
        };
    }

    if path.ends_with("/models/slow-model:generateContent") {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    let reply = if path.ends_with("/endpoints/42:predict") {
        json!({"predictions": ["<start_of_turn>model\nHello there<end_of_turn>"]})
    } else if path.ends_with("/endpoints/404:predict") {
        let err = json!({"error": {"code": 404, "message": "endpoint missing", "status": "NOT_FOUND"}});
        return (StatusCode::NOT_FOUND, axum::Json(err)).into_response();
    } else if path.ends_with("/models/text-embedding-004:predict") {
        json!({"predictions": [{"embeddings": {"values": [0.1, 0.2, 0.3]}}]})
    } else if path.ends_with(":generateContent") {
        json!({"candidates": [{"content": {"role": "model", "parts": [{"text": "Use the"}, {"text": ""}, {"text": "blue bin"}]}}]})
    } else if method == Method::POST && path.ends_with("/queries") {
        let query = log.lock().unwrap().last().map(|r| r.body["query"].to_string()).unwrap_or_default();
        if query.contains("paged_hotels") {
            json!({"jobComplete": true, "jobReference": {"jobId": "paged", "location": "EU"}, "rows": [hotel_row("Page One Lodge")], "pageToken": "p2"})
        } else if query.contains("stuck_hotels") {
            json!({"jobComplete": false, "jobReference": {"jobId": "stuck"}})
        } else {
            json!({"jobComplete": false, "jobReference": {"projectId": "test-project", "jobId": "job1", "location": "US"}})
        }
    } else if method == Method::GET && path.ends_with("/queries/paged") {
        json!({"jobComplete": true, "jobReference": {"jobId": "paged", "location": "EU"}, "rows": [hotel_row("Page Two Hostel")]})
    } else if method == Method::GET && path.ends_with("/queries/stuck") {
        json!({"jobComplete": false, "jobReference": {"jobId": "stuck"}})
    } else if method == Method::GET && path.ends_with("/queries/job1") {
        let row: Value = serde_json::from_str(HOTEL_ROW).unwrap();
        json!({"jobComplete": true, "jobReference": {"jobId": "job1", "location": "US"}, "rows": [row]})
    } else {
        return StatusCode::NOT_FOUND.into_response();
    };
    axum::Json(reply).into_response()
}

async fn start_mock() -> (SocketAddr, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(mock).with_state(log.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, log)
}

fn config_against(addr: SocketAddr, kind: AgentKind) -> Config {
    let mut cfg = Config::test_default(kind).unwrap();
    cfg.gcp.aiplatform_base_url = Some(format!("http://{addr}/v1"));
    cfg.gcp.bigquery_base_url = format!("http://{addr}/bigquery/v2");
    cfg.gcp.metadata_base_url = format!("http://{addr}/computeMetadata/v1");
    cfg
}

fn ask(message: &str) -> AskInput {
    AskInput { session: None, message: message.into() }
}

#[tokio::test]
async fn turn_chat_over_prediction_endpoint() {
    let (addr, log) = start_mock().await;
    let mut cfg = config_against(addr, AgentKind::TurnChat);
    cfg.llm.provider = "prediction".into();
    cfg.llm.prediction.endpoint_id = Some("42".into());

    let (agent, _) = agents::build(&cfg).await.unwrap();
    let out = agent.ask(ask("Hi")).await.unwrap();
    assert_eq!(out.message, "\nHello there");

    let calls = log.lock().unwrap().clone();
    let call = &calls[0];
    assert_eq!(call.path, "/v1/projects/test-project/locations/us-central1/endpoints/42:predict");
    assert_eq!(call.auth.as_deref(), Some("Bearer test-token"));
    let inputs = call.body["instances"][0]["inputs"].as_str().unwrap();
    assert!(inputs.starts_with("Respond in plain text. No formatting.\n<start_of_turn>user\nHi<end_of_turn>"));
    assert!(inputs.ends_with("\n<start_of_turn>model"));
    assert_eq!(call.body["parameters"]["raw"], true);
    assert_eq!(call.body["parameters"]["maxInputTokens"], 2048);
    assert_eq!(call.body["parameters"]["maxOutputTokens"], 256);
}

#[tokio::test]
async fn prediction_error_envelope_surfaces() {
    let (addr, _) = start_mock().await;
    let mut cfg = config_against(addr, AgentKind::TurnChat);
    cfg.llm.provider = "prediction".into();
    cfg.llm.prediction.endpoint_id = Some("404".into());

    let (agent, _) = agents::build(&cfg).await.unwrap();
    let err = agent.ask(ask("Hi")).await.unwrap_err();
    assert_eq!(err.to_string(), "chat response error: model failed to respond: HTTP 404: NOT_FOUND: endpoint missing");
}

#[tokio::test]
async fn gemini_chat_sends_history_and_instructions() {
    let (addr, log) = start_mock().await;
    let mut cfg = config_against(addr, AgentKind::GeminiChat);
    cfg.llm.provider = "gemini".into();

    let (agent, _) = agents::build(&cfg).await.unwrap();
    let first = agent.ask(ask("Pizza box?")).await.unwrap();
    assert_eq!(first.message, "Use the. blue bin");
    let sid = first.session.unwrap();
    agent.ask(AskInput { session: Some(sid), message: "Greasy one?".into() }).await.unwrap();

    let calls = log.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].path.ends_with("/publishers/google/models/gemini-1.5-flash-001:generateContent"));
    let contents = calls[1].body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 3);
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][0]["text"], "Use the. blue bin");
    let system = calls[1].body["systemInstruction"]["parts"][0]["text"].as_str().unwrap();
    assert!(system.starts_with("You are a friendly and helpful waste sorting assistant."));
}

#[tokio::test]
async fn rag_embeds_searches_and_answers() {
    let (addr, log) = start_mock().await;
    let mut cfg = config_against(addr, AgentKind::Rag);
    cfg.llm.provider = "gemini".into();
    cfg.embedding.provider = "vertex".into();
    cfg.embedding.dimensionality = 768;
    cfg.retrieval.provider = "bigquery".into();

    let (agent, _) = agents::build(&cfg).await.unwrap();
    let out = agent.ask(ask("Quiet hotel near the water")).await.unwrap();
    assert_eq!(out.session, None);
    assert_eq!(out.message, "Use the. blue bin");

    let calls = log.lock().unwrap().clone();
    let paths: Vec<&str> = calls.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(
        paths,
        [
            "/v1/projects/test-project/locations/us-central1/publishers/google/models/text-embedding-004:predict",
            "/bigquery/v2/projects/test-project/queries",
            "/bigquery/v2/projects/test-project/queries/job1",
            "/v1/projects/test-project/locations/us-central1/publishers/google/models/gemini-1.5-flash-001:generateContent",
        ]
    );

    assert_eq!(calls[0].body["instances"][0]["task_type"], "QUESTION_ANSWERING");
    assert_eq!(calls[0].body["parameters"]["outputDimensionality"], 768);

    let query = &calls[1].body;
    assert_eq!(query["useLegacySql"], false);
    assert_eq!(query["parameterMode"], "NAMED");
    assert_eq!(query["queryParameters"][0]["name"], "embeddings");
    assert_eq!(query["queryParameters"][0]["parameterValue"]["arrayValues"].as_array().unwrap().len(), 3);
    assert!(query["query"].as_str().unwrap().contains("VECTOR_SEARCH(TABLE genai_upskilling.hotels_fictional_data"));

    assert_eq!(calls[2].method, "GET");
    assert!(calls[2].query.contains("location=US"));

    let prompt = calls[3].body["contents"][0]["parts"][0]["text"].as_str().unwrap();
    assert!(prompt.starts_with("Quiet hotel near the water\nUse the following list of hotels for suggestions."));
    assert!(prompt.ends_with(
        r#"{"name":"Harborlight Inn","address":"12 Pier Street","description":"Waterfront inn","attractions":"Aquarium"}"#
    ));
    assert!(calls[3].body.get("systemInstruction").is_none());
}

#[tokio::test]
async fn metadata_server_fills_project_region_and_token() {
    let (addr, log) = start_mock().await;
    let mut cfg = config_against(addr, AgentKind::GeminiChat);
    cfg.gcp.project_id = None;
    cfg.gcp.region = None;
    cfg.gcp.access_token = None;

    let ctx = GcpContext::resolve(&cfg.gcp).await.unwrap();
    assert_eq!(ctx.project_id(), "meta-project");
    assert_eq!(ctx.region(), "europe-west1");

    cfg.llm.provider = "gemini".into();
    let (agent, _) = agents::build(&cfg).await.unwrap();
    agent.ask(ask("hello")).await.unwrap();
    agent.ask(ask("again")).await.unwrap();

    let calls = log.lock().unwrap().clone();
    let generate: Vec<&Recorded> = calls.iter().filter(|c| c.path.ends_with(":generateContent")).collect();
    assert_eq!(generate.len(), 2);
    assert!(generate[0].path.starts_with("/v1/projects/meta-project/locations/europe-west1/"));
    assert!(generate.iter().all(|c| c.auth.as_deref() == Some("Bearer meta-token")));

    // Token is cached after the first fetch by the built agent.
    let token_fetches = calls
        .iter()
        .filter(|c| c.path.ends_with("/service-accounts/default/token"))
        .count();
    assert_eq!(token_fetches, 1);
}

#[tokio::test]
async fn missing_metadata_server_is_startup_error() {
    let mut cfg = Config::test_default(AgentKind::GeminiChat).unwrap();
    cfg.llm.provider = "gemini".into();
    cfg.gcp.project_id = None;
    cfg.gcp.metadata_base_url = "http://127.0.0.1:9/computeMetadata/v1".into();
    let err = agents::build(&cfg).await.unwrap_err();
    assert!(err.to_string().contains("could not retrieve current project ID"));
}

fn bigquery_against(addr: SocketAddr, table: &str, max_poll_attempts: u32) -> BigQuerySearch {
    let cfg = config_against(addr, AgentKind::Rag);
    let gcp = GcpContext::new(
        reqwest::Client::new(),
        "test-project".into(),
        "us-central1".into(),
        &cfg.gcp,
        TokenSource::Static("test-token".into()),
    );
    let mut bq = cfg.retrieval.bigquery.clone();
    bq.table = table.into();
    bq.max_poll_attempts = max_poll_attempts;
    BigQuerySearch::new(gcp, &bq)
}

#[tokio::test]
async fn bigquery_follows_page_tokens() {
    let (addr, log) = start_mock().await;
    let search = bigquery_against(addr, "genai_upskilling.paged_hotels", 3);

    let hotels = search.search(&[0.5, 0.5]).await.unwrap();
    let names: Vec<&str> = hotels.iter().map(|h| h.name.as_str()).collect();
    assert_eq!(names, ["Page One Lodge", "Page Two Hostel"]);
    assert_eq!(hotels[0].description, "");

    let calls = log.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].method, "GET");
    assert!(calls[1].query.contains("pageToken=p2"));
    assert!(calls[1].query.contains("location=EU"));
}

#[tokio::test]
async fn bigquery_gives_up_after_max_polls() {
    let (addr, log) = start_mock().await;
    let search = bigquery_against(addr, "genai_upskilling.stuck_hotels", 2);

    let err = search.search(&[1.0]).await.unwrap_err();
    assert_eq!(err.to_string(), "bigquery job did not complete after 2 polls");

    let polls = log.lock().unwrap().iter().filter(|c| c.path.ends_with("/queries/stuck")).count();
    assert_eq!(polls, 2);
}

#[tokio::test]
async fn short_lived_metadata_token_is_refetched() {
    let (addr, log) = start_mock().await;
    let mut cfg = config_against(addr, AgentKind::GeminiChat);
    cfg.gcp.access_token = None;
    cfg.gcp.metadata_base_url = format!("http://{addr}/short-lived/computeMetadata/v1");
    cfg.llm.provider = "gemini".into();

    let (agent, _) = agents::build(&cfg).await.unwrap();
    agent.ask(ask("hello")).await.unwrap();
    agent.ask(ask("again")).await.unwrap();

    let token_fetches = log
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.path.ends_with("/service-accounts/default/token"))
        .count();
    assert_eq!(token_fetches, 2);
}

#[tokio::test]
async fn timed_out_gemini_call_leaves_history_untouched() {
    let (addr, _) = start_mock().await;
    let mut cfg = config_against(addr, AgentKind::GeminiChat);
    cfg.llm.provider = "gemini".into();
    cfg.llm.gemini.model = "slow-model".into();

    let (agent, _) = agents::build(&cfg).await.unwrap();
    let input = AskInput { session: Some("slow".into()), message: "hello".into() };
    let outcome = tokio::time::timeout(Duration::from_millis(200), agent.ask(input)).await;
    assert!(outcome.is_err());

    let Agent::GeminiChat(inner) = &agent else {
        panic!("expected gemini_chat agent");
    };
    let session = inner.sessions().get_or_create("slow").await;
    assert!(session.lock().await.state.is_empty());
}
