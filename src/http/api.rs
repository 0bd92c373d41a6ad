//! `/ask` and `/health` handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use super::HttpState;
use crate::agents::AskInput;

#[derive(Debug, Default, Deserialize)]
struct AskRequest {
    #[serde(default)]
    session: Option<String>,
    #[serde(default)]
    message: Option<String>,
    /// Accepted for client compatibility; not used by any agent.
    #[serde(default)]
    loc: Option<String>,
    #[serde(default)]
    company: Option<String>,
}

#[derive(Debug, Serialize)]
struct AskResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<String>,
    message: String,
}

fn report_error(code: StatusCode, msg: impl std::fmt::Display) -> Response {
    let msg = msg.to_string();
    error!(response_code = code.as_u16(), "{msg}");
    (code, Json(json!({ "error": msg }))).into_response()
}

/// POST /ask
pub(super) async fn ask(State(state): State<HttpState>, body: Bytes) -> Response {
    let req: AskRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AskRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(r) => r,
            Err(e) => return report_error(StatusCode::BAD_REQUEST, format!("invalid input: {e}")),
        }
    };

    let message = req.message.unwrap_or_default();
    if message.is_empty() {
        return report_error(StatusCode::BAD_REQUEST, "request message is empty");
    }
    if req.loc.is_some() || req.company.is_some() {
        debug!(loc = ?req.loc, company = ?req.company, "ignoring location hints");
    }

    let input = AskInput { session: req.session, message };
    match tokio::time::timeout(state.request_timeout, state.agent.ask(input)).await {
        Ok(Ok(out)) => (StatusCode::OK, Json(AskResponse { session: out.session, message: out.message })).into_response(),
        Ok(Err(e)) => report_error(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(_) => report_error(StatusCode::GATEWAY_TIMEOUT, "request timed out"),
    }
}

/// GET /health
pub(super) async fn health(State(state): State<HttpState>) -> Response {
    let body = json!({
        "status": "ok",
        "agent": state.agent.kind().as_str(),
        "sessions": state.agent.session_count().await,
    });
    (StatusCode::OK, Json(body)).into_response()
}
