//! Route dispatch for the admin API.

use crate::admin::handlers;
use crate::admin::types::not_found;
use crate::engine::StubEngine;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Every admin path starts with this prefix.
pub const ADMIN_PREFIX: &str = "/_specmock";

/// Parsed route below `/_specmock`
#[derive(Debug, PartialEq, Eq)]
enum AdminRoute<'a> {
    /// GET /_specmock/health
    Health,
    /// GET/POST/DELETE /_specmock/stubs (DELETE drops transient stubs)
    Stubs,
    /// GET/DELETE /_specmock/stubs/:token
    StubByToken(&'a str),
    /// GET /_specmock/interactions
    Interactions,
}

impl<'a> AdminRoute<'a> {
    fn parse(segments: &[&'a str]) -> Option<Self> {
        match segments {
            ["health"] => Some(AdminRoute::Health),
            ["stubs"] => Some(AdminRoute::Stubs),
            ["stubs", token] if !token.is_empty() => Some(AdminRoute::StubByToken(*token)),
            ["interactions"] => Some(AdminRoute::Interactions),
            _ => None,
        }
    }
}

pub fn is_admin_path(path: &str) -> bool {
    path == ADMIN_PREFIX || path.starts_with("/_specmock/")
}

pub async fn route_request(req: Request<Incoming>, engine: Arc<StubEngine>) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("Admin API: {} {}", method, path);

    let rest = path.strip_prefix(ADMIN_PREFIX).unwrap_or_default();
    let segments: Vec<&str> = rest.trim_matches('/').split('/').collect();
    let Some(route) = AdminRoute::parse(&segments) else {
        return not_found();
    };

    match (&method, route) {
        (&Method::GET, AdminRoute::Health) => handlers::handle_health(&engine),
        (&Method::GET, AdminRoute::Stubs) => handlers::handle_list(&engine),
        (&Method::POST, AdminRoute::Stubs) => handlers::handle_register(req, &engine).await,
        (&Method::DELETE, AdminRoute::Stubs) => handlers::handle_clear(&engine),
        (&Method::GET, AdminRoute::StubByToken(token)) => handlers::handle_get(token, &engine),
        (&Method::DELETE, AdminRoute::StubByToken(token)) => handlers::handle_unregister(token, &engine),
        (&Method::GET, AdminRoute::Interactions) => handlers::handle_interactions(&engine),
        _ => not_found(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_routes() {
        assert_eq!(AdminRoute::parse(&["health"]), Some(AdminRoute::Health));
        assert_eq!(AdminRoute::parse(&["stubs"]), Some(AdminRoute::Stubs));
        assert_eq!(
            AdminRoute::parse(&["stubs", "abc"]),
            Some(AdminRoute::StubByToken("abc"))
        );
        assert_eq!(AdminRoute::parse(&["stubs", "abc", "x"]), None);
        assert_eq!(AdminRoute::parse(&["nope"]), None);
    }

    #[test]
    fn test_admin_path_prefix() {
        assert!(is_admin_path("/_specmock/stubs"));
        assert!(is_admin_path("/_specmock"));
        assert!(!is_admin_path("/_specmockery"));
        assert!(!is_admin_path("/items"));
    }
}
