//! Response types and helpers shared by the admin API and the stub handler.

use crate::http::{HttpResponse, CONTENT_TYPE};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use tracing::error;

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

/// Individual error detail
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Body of a successful registration
#[derive(Debug, Serialize)]
pub struct RegisteredStub {
    pub token: String,
}

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string_pretty(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with headers.
///
/// Falls back to a bare 500 if the builder rejects a header.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder
        .body(Full::new(body.into()))
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to build response");
            let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        })
}

/// Create an error response with a machine code and a message
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "no such resource", "Not Found")
}

/// Convert an engine response to a hyper response.
pub fn to_hyper(response: &HttpResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let (content_type, body) = response.render_body();
    let headers = response
        .headers
        .iter()
        .filter(|(k, _)| !k.eq_ignore_ascii_case(CONTENT_TYPE))
        .map(|(k, v)| (k.clone(), v.clone()))
        .chain(content_type.map(|ct| ("Content-Type".to_string(), ct)));
    build_response_with_headers(status, headers, body)
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use specmock_core::Value;

    #[test]
    fn test_error_response_shape() {
        let response = error_response(StatusCode::BAD_REQUEST, "bad data", "oops");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
    }

    #[test]
    fn test_to_hyper_uses_rendered_content_type() {
        let response = HttpResponse::new(201)
            .with_header("X-Trace", "abc")
            .with_body(Value::from(serde_json::json!({"id": 1})));
        let hyper_response = to_hyper(&response);
        assert_eq!(hyper_response.status(), StatusCode::CREATED);
        assert_eq!(hyper_response.headers()["content-type"], "application/json");
        assert_eq!(hyper_response.headers()["x-trace"], "abc");
    }

    #[test]
    fn test_unsendable_header_becomes_server_error() {
        let response = HttpResponse::new(404).with_header("X-Bad", "a\nb");
        let hyper_response = to_hyper(&response);
        assert_eq!(hyper_response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_to_hyper_keeps_explicit_content_type() {
        let response = HttpResponse::new(200)
            .with_header("content-type", "application/vnd.item+json")
            .with_body(Value::from(serde_json::json!({"id": 1})));
        let hyper_response = to_hyper(&response);
        assert_eq!(
            hyper_response.headers()["content-type"],
            "application/vnd.item+json"
        );
        assert_eq!(hyper_response.headers().get_all("content-type").iter().count(), 1);
    }
}
