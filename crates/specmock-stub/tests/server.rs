//! End-to-end tests: the server runs in-process on an ephemeral port and is
//! driven over HTTP.

use reqwest::{Client, StatusCode};
use serde_json::json;
use specmock_stub::{Contract, MatchMode, MemorySink, StubEngine, StubServer, TelemetrySink};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CONTRACT: &str = r#"
types:
  Item:
    id: "(number)"
    name: "(string)"
operations:
  - id: getItem
    method: GET
    path: /items/(id:number)
    request:
      headers: { "X-Flag?": "(number)" }
    response:
      status: 200
      body: "(Item)"
  - id: createItem
    method: POST
    path: /items
    request:
      body: "(Item)"
    response:
      status: 201
      body: "(Item)"
"#;

struct TestServer {
    addr: SocketAddr,
    client: Client,
    memory: Arc<MemorySink>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

async fn start(mode: MatchMode, stub_dir: Option<&std::path::Path>) -> TestServer {
    let contract = Contract::parse("items.yaml", CONTRACT).unwrap();
    let memory = Arc::new(MemorySink::default());
    let engine = StubEngine::new(contract, mode).with_telemetry(memory.clone());
    if let Some(dir) = stub_dir {
        engine.load_files(&[dir.to_path_buf()]);
    }
    let server = StubServer::bind("127.0.0.1:0", Arc::new(engine)).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    let client = Client::builder().no_proxy().build().unwrap();
    TestServer {
        addr,
        client,
        memory,
    }
}

fn write_stub(dir: &std::path::Path, name: &str, stub: serde_json::Value) {
    std::fs::write(dir.join(name), serde_json::to_string_pretty(&stub).unwrap()).unwrap();
}

fn item_stub_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_stub(
        dir.path(),
        "generic.json",
        json!({
            "http-stub-id": "generic",
            "http-request": {"method": "GET", "path": "/items/(number)"},
            "http-response": {"status": 200, "body": {"id": 1, "name": "generic"}}
        }),
    );
    write_stub(
        dir.path(),
        "flagged.json",
        json!({
            "http-stub-id": "flagged",
            "http-request": {"method": "GET", "path": "/items/(number)", "headers": {"X-Flag": "1"}},
            "http-response": {"status": 200, "body": {"id": 2, "name": "flagged"}}
        }),
    );
    write_stub(
        dir.path(),
        "invalid.json",
        json!({
            "http-request": {"method": "GET", "path": "/items/3"},
            "http-response": {"status": 200, "body": {"id": "three", "name": "x"}}
        }),
    );
    dir
}

#[tokio::test]
async fn test_most_specific_file_stub_answers() {
    let dir = item_stub_dir();
    let server = start(MatchMode::Strict, Some(dir.path())).await;

    let flagged: serde_json::Value = server
        .client
        .get(server.url("/items/5"))
        .header("X-Flag", "1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(flagged["name"], "flagged");

    let response = server.client.get(server.url("/items/5")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let generic: serde_json::Value = response.json().await.unwrap();
    assert_eq!(generic["name"], "generic");
}

#[tokio::test]
async fn test_strict_mode_returns_report() {
    let dir = item_stub_dir();
    let server = start(MatchMode::Strict, Some(dir.path())).await;

    // the invalid stub was skipped at load, so nothing serves /orders
    let response = server.client.get(server.url("/orders/1")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let report = response.text().await.unwrap();
    assert!(report.contains("No stub matched GET /orders/1"), "{report}");

    let records = server.memory.recent();
    assert_eq!(records.last().unwrap().result, "failure");
}

#[tokio::test]
async fn test_lenient_mode_generates_from_contract() {
    let server = start(MatchMode::Lenient, None).await;

    let response = server
        .client
        .post(server.url("/items"))
        .json(&json!({"id": 9, "name": "nine"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-specmock-generated"], "true");
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["id"].is_number());
    assert!(body["name"].is_string());

    let bad = server
        .client
        .post(server.url("/items"))
        .json(&json!({"id": "nine", "name": "nine"}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    let report = bad.text().await.unwrap();
    assert!(report.contains("REQUEST.BODY.id"), "{report}");
}

#[tokio::test]
async fn test_admin_register_and_unregister() {
    let server = start(MatchMode::Strict, None).await;

    let registered = server
        .client
        .post(server.url("/_specmock/stubs"))
        .json(&json!({
            "http-request": {"method": "GET", "path": "/items/7"},
            "http-response": {"status": 200, "body": {"id": 7, "name": "(string)"}}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(registered.status(), StatusCode::CREATED);
    let token = registered.json::<serde_json::Value>().await.unwrap()["token"]
        .as_str()
        .unwrap()
        .to_string();

    let served: serde_json::Value = server
        .client
        .get(server.url("/items/7"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(served["id"], 7);
    assert!(served["name"].is_string());

    let listed: serde_json::Value = server
        .client
        .get(server.url("/_specmock/stubs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["stubs"][0]["token"], token.as_str());
    assert_eq!(listed["stubs"][0]["origin"], "transient");

    let deleted = server
        .client
        .delete(server.url(&format!("/_specmock/stubs/{token}")))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);

    let again = server
        .client
        .delete(server.url(&format!("/_specmock/stubs/{token}")))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::NOT_FOUND);

    let gone = server.client.get(server.url("/items/7")).send().await.unwrap();
    assert_eq!(gone.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_rejects_stub_violating_contract() {
    let server = start(MatchMode::Strict, None).await;

    let response = server
        .client
        .post(server.url("/_specmock/stubs"))
        .json(&json!({
            "http-request": {"method": "GET", "path": "/items/7"},
            "http-response": {"status": 200, "body": {"id": "seven", "name": "x"}}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["errors"][0]["code"], "contract mismatch");
    let message = body["errors"][0]["message"].as_str().unwrap();
    assert!(message.contains("RESPONSE.BODY.id"), "{message}");

    let malformed = server
        .client
        .post(server.url("/_specmock/stubs"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_rejects_unsendable_stubs() {
    let server = start(MatchMode::Strict, None).await;

    for stub in [
        json!({
            "http-request": {"method": "GET", "path": "/items/7"},
            "http-response": {"status": 404, "headers": {"X-Bad": "a\nb"}}
        }),
        json!({
            "delay-in-seconds": 1e20,
            "http-request": {"method": "GET", "path": "/items/7"},
            "http-response": {"status": 200, "body": {"id": 7, "name": "x"}}
        }),
    ] {
        let response = server
            .client
            .post(server.url("/_specmock/stubs"))
            .json(&stub)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["errors"][0]["code"], "invalid stub");
    }
}

#[tokio::test]
async fn test_transient_stub_overrides_file_stub() {
    let dir = tempfile::tempdir().unwrap();
    write_stub(
        dir.path(),
        "one.json",
        json!({
            "http-stub-id": "file-one",
            "http-request": {"method": "GET", "path": "/items/1"},
            "http-response": {"status": 200, "body": {"id": 1, "name": "file"}}
        }),
    );
    let server = start(MatchMode::Strict, Some(dir.path())).await;
    let registered = server
        .client
        .post(server.url("/_specmock/stubs"))
        .json(&json!({
            "http-request": {"method": "GET", "path": "/items/1"},
            "http-response": {"status": 200, "body": {"id": 1, "name": "transient"}}
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(registered.status(), StatusCode::CREATED);

    let served: serde_json::Value = server
        .client
        .get(server.url("/items/1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(served["name"], "transient");
}

#[tokio::test]
async fn test_debug_header_explains_match() {
    let dir = item_stub_dir();
    let server = start(MatchMode::Strict, Some(dir.path())).await;

    let response = server
        .client
        .get(server.url("/items/5"))
        .header("X-Specmock-Debug", "true")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["x-specmock-debug-response"], "true");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["debug"], true);
    assert_eq!(body["selected"]["token"], "generic");
    assert_eq!(body["candidates"].as_array().unwrap().len(), 2);

    // debug requests are not served, so nothing is recorded
    assert!(server.memory.recent().is_empty());
}

#[tokio::test]
async fn test_xml_request_gets_xml_response() {
    let dir = item_stub_dir();
    let server = start(MatchMode::Strict, Some(dir.path())).await;

    let response = server
        .client
        .get(server.url("/items/5"))
        .header("Content-Type", "application/xml")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/xml");
    let text = response.text().await.unwrap();
    assert!(text.contains("<name>generic</name>"), "{text}");
}

#[tokio::test]
async fn test_delay_is_applied() {
    let server = start(MatchMode::Strict, None).await;
    server
        .client
        .post(server.url("/_specmock/stubs"))
        .json(&json!({
            "delay-in-seconds": 0.3,
            "http-request": {"method": "GET", "path": "/items/8"},
            "http-response": {"status": 200, "body": {"id": 8, "name": "slow"}}
        }))
        .send()
        .await
        .unwrap();

    let started = Instant::now();
    let response = server.client.get(server.url("/items/8")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_health_and_interactions() {
    let server = start(MatchMode::Lenient, None).await;
    server.client.get(server.url("/items/1")).send().await.unwrap();

    let health: serde_json::Value = server
        .client
        .get(server.url("/_specmock/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["mode"], "lenient");
    assert_eq!(health["operations"], 2);

    let interactions: serde_json::Value = server
        .client
        .get(server.url("/_specmock/interactions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first = &interactions["interactions"][0];
    assert_eq!(first["path"], "/items/1");
    assert_eq!(first["responseStatus"], 200);
    assert_eq!(first["specification"], "items.yaml");
}
