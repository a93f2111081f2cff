//! Admin handlers: stub registration, listing and removal, interaction
//! history, health.

use crate::admin::types::{collect_body, error_response, json_response, RegisteredStub};
use crate::engine::StubEngine;
use crate::error::StubError;
use crate::stub::StubDocument;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde_json::json;
use tracing::warn;

/// GET /_specmock/health
pub fn handle_health(engine: &StubEngine) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "mode": engine.mode(),
            "operations": engine.contract().operations().len(),
            "stubs": engine.pool().len(),
        }),
    )
}

/// GET /_specmock/stubs
pub fn handle_list(engine: &StubEngine) -> Response<Full<Bytes>> {
    let stubs: Vec<serde_json::Value> = engine.pool().snapshot().iter().map(|e| e.summary()).collect();
    json_response(StatusCode::OK, &json!({ "stubs": stubs }))
}

/// GET /_specmock/stubs/:token
pub fn handle_get(token: &str, engine: &StubEngine) -> Response<Full<Bytes>> {
    match engine.pool().snapshot().iter().find(|e| e.token == token) {
        Some(entry) => json_response(StatusCode::OK, &entry.summary()),
        None => stub_not_found(token),
    }
}

/// POST /_specmock/stubs - validate and register a transient stub
pub async fn handle_register(req: Request<Incoming>, engine: &StubEngine) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "bad data", &e),
    };
    let registered = std::str::from_utf8(&body)
        .map_err(|e| StubError::Parse(e.to_string()))
        .and_then(StubDocument::parse)
        .and_then(|document| engine.register(document));

    match registered {
        Ok(entry) => json_response(
            StatusCode::CREATED,
            &RegisteredStub {
                token: entry.token.clone(),
            },
        ),
        Err(e) => {
            warn!(error = %e, "Rejected stub registration");
            let status = match e {
                StubError::DuplicateToken(_) => StatusCode::CONFLICT,
                _ => StatusCode::BAD_REQUEST,
            };
            error_response(status, e.code(), &e.to_string())
        }
    }
}

/// DELETE /_specmock/stubs/:token
pub fn handle_unregister(token: &str, engine: &StubEngine) -> Response<Full<Bytes>> {
    if engine.unregister(token) {
        json_response(StatusCode::OK, &json!({ "token": token }))
    } else {
        stub_not_found(token)
    }
}

/// DELETE /_specmock/stubs - drop every transient stub
pub fn handle_clear(engine: &StubEngine) -> Response<Full<Bytes>> {
    let removed = engine.pool().clear_transient();
    json_response(StatusCode::OK, &json!({ "removed": removed }))
}

/// GET /_specmock/interactions
pub fn handle_interactions(engine: &StubEngine) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({ "interactions": engine.telemetry().recent() }),
    )
}

fn stub_not_found(token: &str) -> Response<Full<Bytes>> {
    error_response(
        StatusCode::NOT_FOUND,
        "no such resource",
        &format!("No stub with token {token}"),
    )
}
