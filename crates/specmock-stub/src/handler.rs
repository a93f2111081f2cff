//! Per-request entry point: admin dispatch, debug mode and stub serving.

use crate::admin::types::{build_response_with_headers, error_response, to_hyper};
use crate::admin::{is_admin_path, route_request};
use crate::engine::StubEngine;
use crate::http::HttpRequest;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error};

/// Request header that asks for match diagnostics instead of a response.
pub const DEBUG_HEADER: &str = "X-Specmock-Debug";
/// Marks a diagnostics reply.
pub const DEBUG_RESPONSE_HEADER: &str = "X-Specmock-Debug-Response";

pub async fn handle_request(
    req: Request<Incoming>,
    engine: Arc<StubEngine>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if is_admin_path(req.uri().path()) {
        return Ok(route_request(req, engine).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return Ok(error_response(
                StatusCode::BAD_REQUEST,
                "bad data",
                &format!("Failed to read request body: {e}"),
            ))
        }
    };
    let headers: Vec<(&str, &str)> = parts
        .headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect();
    let mut request = HttpRequest::from_parts(
        parts.method.as_str(),
        parts.uri.path(),
        parts.uri.query(),
        headers,
        &bytes,
    );

    if is_debug(&request) {
        request.headers.shift_remove(&DEBUG_HEADER.to_ascii_lowercase());
        return Ok(handle_debug_request(&engine, &request));
    }

    let response = engine.respond(request).await;
    Ok(to_hyper(&response))
}

fn is_debug(request: &HttpRequest) -> bool {
    request
        .header(DEBUG_HEADER)
        .is_some_and(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn handle_debug_request(engine: &StubEngine, request: &HttpRequest) -> Response<Full<Bytes>> {
    debug!("Debug mode enabled for request {} {}", request.method, request.path);
    match engine.explain(request) {
        Ok(explanation) => {
            let body = serde_json::to_string_pretty(&explanation)
                .unwrap_or_else(|_| r#"{"error": "Failed to serialize debug response"}"#.to_string());
            build_response_with_headers(
                StatusCode::OK,
                [
                    ("Content-Type", "application/json"),
                    (DEBUG_RESPONSE_HEADER, "true"),
                ],
                body,
            )
        }
        Err(e) => {
            error!(error = %e, "Debug match failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "invalid pattern", &e.to_string())
        }
    }
}
