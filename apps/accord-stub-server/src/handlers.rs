use std::time::Instant;

use accord_core::{synthesize_stub, IncomingRequest, StubError, StubResponse};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::{responses, AppState};

pub async fn healthz() -> impl IntoResponse {
    Json(json!({"ok": true}))
}

/// Contracts in match order.
pub async fn contracts(State(state): State<AppState>) -> impl IntoResponse {
    let items: Vec<Value> = state
        .registry
        .all()
        .map(|contract| {
            json!({
                "id": contract.id,
                "priority": contract.priority,
                "description": contract.description,
                "method": contract.request.method,
                "url": contract.request.url,
            })
        })
        .collect();
    Json(json!({"items": items}))
}

/// Fallback for every non-admin route: match, synthesise, write.
pub async fn serve_stub(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    let request = incoming_request(&method, &uri, &headers, &body);

    let (response, contract_id) = match state.registry.match_request(&request) {
        None => (
            responses::unmatched(
                state.unmatched_status,
                &request.method,
                &request.path,
                state.registry.len(),
            ),
            "unmatched".to_string(),
        ),
        Some(contract) => {
            let id = contract.id.clone();
            let response = match synthesize_stub(contract, &request) {
                Ok(stub) if stub.deferred => complete_deferred(stub).await,
                Ok(stub) => complete(stub).await,
                Err(err) => {
                    let kind = match &err {
                        StubError::Resolution(_) => "resolution",
                        StubError::Specification(_) => "specification",
                    };
                    tracing::warn!(
                        target: "accord::stub",
                        contract_id = %id,
                        kind,
                        error = %err,
                        "stub synthesis failed"
                    );
                    responses::synthesis_failed(&id, err.to_string())
                }
            };
            (response, id)
        }
    };

    tracing::info!(
        target: "http.access",
        method = %request.method,
        path = %request.path,
        status = response.status().as_u16(),
        contract_id = %contract_id,
        latency_ms = started.elapsed().as_millis() as u64,
        "stub request"
    );
    response
}

fn incoming_request(
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
) -> IncomingRequest {
    let query: Vec<(String, String)> = uri
        .query()
        .map(|raw| {
            url::form_urlencoded::parse(raw.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();
    let headers: Vec<(String, String)> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = if body.is_empty() {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(body)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned())),
        )
    };
    IncomingRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query,
        headers,
        body,
    }
}

async fn complete(stub: StubResponse) -> Response {
    if let Some(delay) = stub.delay {
        tokio::time::sleep(delay).await;
    }
    render(stub)
}

/// Serves an `async` contract: the delay and the render run on their own task and the
/// connection task only awaits the hand-off. Status, headers and body are the same as
/// [`complete`] would produce; a completion task that dies answers 500.
async fn complete_deferred(stub: StubResponse) -> Response {
    let contract_id = stub.contract_id.clone();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let _ = tx.send(complete(stub).await);
    });
    match rx.await {
        Ok(response) => response,
        Err(_) => responses::synthesis_failed(&contract_id, "deferred completion dropped".into()),
    }
}

fn render(stub: StubResponse) -> Response {
    let status = StatusCode::from_u16(stub.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut headers = HeaderMap::new();
    for (name, value) in &stub.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => tracing::warn!(
                target: "accord::stub",
                contract_id = %stub.contract_id,
                header = %name,
                "header dropped: not representable on the wire"
            ),
        }
    }

    let body = match stub.body {
        None => Body::empty(),
        Some(Value::String(text)) if declares_non_json(&headers) => Body::from(text),
        Some(value) => {
            headers
                .entry(header::CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            Body::from(value.to_string())
        }
    };
    (status, headers, body).into_response()
}

fn declares_non_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| !value.contains("json"))
}
