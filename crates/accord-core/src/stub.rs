use std::time::Duration;

use accord_contracts::Contract;
use serde_json::Value;

use crate::error::StubError;
use crate::field::Field;
use crate::matcher::IncomingRequest;
use crate::predicate::render_text;
use crate::resolve::{resolve_for_stub, StubContext};

/// Concrete response a stub server writes for one matched request.
#[derive(Debug, Clone, PartialEq)]
pub struct StubResponse {
    pub contract_id: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Completion must happen off the transport's synchronous path.
    pub deferred: bool,
    pub delay: Option<Duration>,
}

/// Builds the stub response for `contract`, reading `FromRequest` values from `request`.
pub fn synthesize_stub(
    contract: &Contract,
    request: &IncomingRequest,
) -> Result<StubResponse, StubError> {
    let ctx = StubContext::new(&contract.id, request);
    let response = &contract.response;

    let mut headers = Vec::with_capacity(response.headers.len());
    for (name, spec) in &response.headers {
        let value = resolve_for_stub(spec, &ctx, &Field::Header(name.clone()))?;
        headers.push((name.clone(), render_text(&value)));
    }
    let body = response
        .body
        .as_ref()
        .map(|spec| resolve_for_stub(spec, &ctx, &Field::body_root()))
        .transpose()?;

    tracing::debug!(
        target: "accord::stub",
        contract_id = %contract.id,
        status = response.status,
        deferred = response.is_async,
        "stub synthesised"
    );
    Ok(StubResponse {
        contract_id: contract.id.clone(),
        status: response.status,
        headers,
        body,
        deferred: response.is_async,
        delay: response.fixed_delay_ms.map(Duration::from_millis),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn headers_and_body_resolve_per_request() {
        let contract: Contract = serde_json::from_value(json!({
            "id": "echo",
            "request": {"method": "GET", "url": "/echo"},
            "response": {
                "status": 201,
                "headers": {
                    "X-Trace": {"$fromRequest": "header:X-Trace"},
                    "X-Id": {"$any": "anyUuid"}
                },
                "body": {"path": {"$fromRequest": "path"}, "tags": [{"$regex": "t-[0-9]{2}"}]},
                "fixedDelayMs": 25
            }
        }))
        .unwrap();
        let request = IncomingRequest::new("GET", "/echo").with_header("x-trace", "abc");
        let stub = synthesize_stub(&contract, &request).unwrap();

        assert_eq!(stub.status, 201);
        assert_eq!(stub.headers[0], ("X-Trace".to_string(), "abc".to_string()));
        assert_eq!(stub.headers[1].1.len(), 36);
        let body = stub.body.unwrap();
        assert_eq!(body["path"], json!("/echo"));
        let tag = body["tags"][0].as_str().unwrap();
        assert!(tag.starts_with("t-") && tag.len() == 4);
        assert_eq!(stub.delay, Some(Duration::from_millis(25)));
        assert!(!stub.deferred);
    }

    #[test]
    fn absent_reference_propagates() {
        let contract: Contract = serde_json::from_value(json!({
            "id": "echo",
            "request": {"method": "GET", "url": "/echo"},
            "response": {"status": 200, "headers": {"X-Trace": {"$fromRequest": "header:X-Trace"}}}
        }))
        .unwrap();
        let err = synthesize_stub(&contract, &IncomingRequest::new("GET", "/echo")).unwrap_err();
        assert!(matches!(err, StubError::Resolution(_)));
    }
}
