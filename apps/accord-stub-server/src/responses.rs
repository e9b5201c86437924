use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

/// RFC 7807-style problem body.
pub fn problem(
    status: StatusCode,
    title: &str,
    detail: String,
    extra: Value,
) -> axum::response::Response {
    let mut body = json!({
        "type": "about:blank",
        "title": title,
        "status": status.as_u16(),
        "detail": detail,
    });
    if let (Value::Object(map), Value::Object(extra)) = (&mut body, extra) {
        map.extend(extra);
    }
    (status, Json(body)).into_response()
}

pub fn unmatched(
    status: StatusCode,
    method: &str,
    path: &str,
    inspected: usize,
) -> axum::response::Response {
    problem(
        status,
        "Unmatched Request",
        format!("no contract matches {method} {path}"),
        json!({"method": method, "path": path, "inspected": inspected}),
    )
}

pub fn synthesis_failed(contract_id: &str, detail: String) -> axum::response::Response {
    problem(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Stub Synthesis Failed",
        detail,
        json!({"contract_id": contract_id}),
    )
}
