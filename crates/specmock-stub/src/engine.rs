//! Request matching and response production.
//!
//! For each request the engine takes one snapshot of the stub pool, matches
//! every stub against it and picks the most specific match. Ties go to
//! transient stubs over file stubs, then to the most recently registered.
//! With no stub matching, strict mode answers with the failure report and
//! lenient mode falls back to generating a response from the contract.

use crate::contract::Contract;
use crate::error::{ResponseError, StubError};
use crate::http::HttpRequest;
use crate::http::{check_header, HttpResponse};
use crate::pattern::Specificity;
use crate::pool::StubPool;
use crate::stub::{discover_stub_files, StubDocument, StubEntry, StubOrigin, StubResponseDocument};
use crate::telemetry::{InteractionRecord, TelemetrySink, TracingSink};
use serde::{Deserialize, Serialize};
use specmock_core::{Failure, FailureReason, MatchResult, PatternError};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Set on responses generated from the contract rather than a stub.
pub const GENERATED_HEADER: &str = "X-Specmock-Generated";

/// Environment variable carrying the request JSON to external commands.
pub const REQUEST_ENV: &str = "SPECMOCK_REQUEST";

pub const DEFAULT_MAX_EXTERNAL_COMMANDS: usize = 4;

/// What to do when no stub matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Answer 400 with the failure report.
    Strict,
    /// Generate a response from the first contract operation the request
    /// satisfies.
    #[default]
    Lenient,
}

/// Outcome of stub selection for one request.
#[derive(Debug, Clone)]
pub enum Selection {
    Stub(Arc<StubEntry>),
    /// Index of the contract operation to generate from.
    Generated(usize),
    NoMatch(Failure),
}

/// Counts from a bulk stub load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub loaded: usize,
    pub skipped: usize,
}

pub struct StubEngine {
    contract: Arc<Contract>,
    pool: StubPool,
    mode: MatchMode,
    commands: Arc<Semaphore>,
    telemetry: Arc<dyn TelemetrySink>,
}

#[derive(Debug, Serialize)]
struct CandidateReport {
    token: String,
    origin: StubOrigin,
    seq: u64,
    request: String,
    wildcards: usize,
    constraints: usize,
    result: serde_json::Value,
}

type Rank = (Specificity, StubOrigin, u64);

fn rank(entry: &StubEntry) -> Rank {
    (entry.request.specificity(), entry.origin, entry.seq)
}

impl StubEngine {
    pub fn new(contract: Contract, mode: MatchMode) -> Self {
        Self {
            contract: Arc::new(contract),
            pool: StubPool::new(),
            mode,
            commands: Arc::new(Semaphore::new(DEFAULT_MAX_EXTERNAL_COMMANDS)),
            telemetry: Arc::new(TracingSink),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Bound the number of external response commands running at once.
    pub fn with_max_external_commands(mut self, max: usize) -> Self {
        self.commands = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    pub fn pool(&self) -> &StubPool {
        &self.pool
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.telemetry
    }

    /// Load stub files and directories into the pool as file stubs.
    ///
    /// Stubs that fail to parse, violate the contract or reuse a token are
    /// logged and skipped; the rest are still served.
    pub fn load_files(&self, paths: &[PathBuf]) -> LoadSummary {
        let mut summary = LoadSummary::default();
        for path in discover_stub_files(paths) {
            let source = path.display().to_string();
            let loaded = StubDocument::from_file(&path)
                .and_then(|doc| StubEntry::compile(doc, StubOrigin::File, source.clone(), &self.contract))
                .and_then(|entry| self.pool.insert(entry));
            match loaded {
                Ok(entry) => {
                    debug!(path = %source, token = %entry.token, "Loaded stub");
                    summary.loaded += 1;
                }
                Err(e) => {
                    warn!(path = %source, error = %e, "Skipping stub");
                    summary.skipped += 1;
                }
            }
        }
        info!(loaded = summary.loaded, skipped = summary.skipped, "Stub files loaded");
        summary
    }

    /// Register a transient stub, validating it against the contract.
    pub fn register(&self, document: StubDocument) -> Result<Arc<StubEntry>, StubError> {
        let entry = StubEntry::compile(document, StubOrigin::Transient, "admin", &self.contract)?;
        let entry = self.pool.insert(entry)?;
        info!(token = %entry.token, request = %entry.request, "Registered stub");
        Ok(entry)
    }

    /// Remove a stub by token. Returns false when no such stub exists.
    pub fn unregister(&self, token: &str) -> bool {
        let removed = self.pool.remove(token).is_some();
        if removed {
            info!(token, "Removed stub");
        }
        removed
    }

    /// Choose what should answer `request`.
    pub fn select(&self, request: &HttpRequest) -> Result<Selection, PatternError> {
        let resolver = self.contract.resolver();
        let snapshot = self.pool.snapshot();

        let mut best: Option<&Arc<StubEntry>> = None;
        let mut misses = Vec::new();
        for entry in snapshot.iter() {
            match entry.request.matches(request, resolver)? {
                result if off_route(&result) => {}
                MatchResult::Success => {
                    if best.is_none_or(|current| rank(entry) > rank(current)) {
                        best = Some(entry);
                    }
                }
                MatchResult::Failure(failure) => misses.push(Failure::aggregate(
                    format!("Stub {} ({})", entry.token, entry.request),
                    vec![failure],
                )),
            }
        }
        if let Some(entry) = best {
            return Ok(Selection::Stub(Arc::clone(entry)));
        }

        if self.mode == MatchMode::Strict {
            return Ok(Selection::NoMatch(no_match(
                format!("No stub matched {} {}", request.method, request.path),
                misses,
            )));
        }

        for (index, operation) in self.contract.operations().iter().enumerate() {
            match operation.request.matches(request, resolver)? {
                result if off_route(&result) => {}
                MatchResult::Success => return Ok(Selection::Generated(index)),
                MatchResult::Failure(failure) => misses.push(Failure::aggregate(
                    format!("In operation {} ({})", operation.id, operation.request),
                    vec![failure],
                )),
            }
        }
        Ok(Selection::NoMatch(no_match(
            format!(
                "No stub or contract operation matched {} {}",
                request.method, request.path
            ),
            misses,
        )))
    }

    /// Serve one request. Never fails: errors become 4xx/5xx responses and
    /// every outcome is recorded with the telemetry sink.
    pub async fn respond(&self, request: HttpRequest) -> HttpResponse {
        let started = Instant::now();
        let selection = self.select(&request);

        let (response, specification, details) = match selection {
            Ok(Selection::Stub(entry)) => match self.serve_stub(&entry, &request).await {
                Ok(response) => (response, Some(entry.token.clone()), None),
                Err(e) => {
                    error!(token = %entry.token, error = %e, "Stub response failed");
                    (text_response(500, e.to_string()), Some(entry.token.clone()), Some(e.to_string()))
                }
            },
            Ok(Selection::Generated(index)) => {
                let source = self.contract.operation(index).map(|op| op.source.clone());
                match self.generate(index) {
                    Ok(response) => (response, source, None),
                    Err(e) => (text_response(500, e.to_string()), source, Some(e.to_string())),
                }
            }
            Ok(Selection::NoMatch(failure)) => {
                let report = failure.report();
                debug!(method = %request.method, path = %request.path, "No match");
                (text_response(400, report.clone()), None, Some(report))
            }
            Err(e) => {
                error!(error = %e, "Matching failed");
                (text_response(500, e.to_string()), None, Some(e.to_string()))
            }
        };

        let response = if details.is_none() && request.is_xml() {
            response.soft_cast_to_xml()
        } else {
            response
        };

        self.telemetry.record(&InteractionRecord {
            path: request.path.clone(),
            method: request.method.clone(),
            response_status: response.status,
            result: if details.is_none() { "success" } else { "failure" }.to_string(),
            specification,
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: chrono::Utc::now().to_rfc3339(),
            details,
        });
        response
    }

    async fn serve_stub(&self, entry: &StubEntry, request: &HttpRequest) -> Result<HttpResponse, ResponseError> {
        if let Some(delay) = entry.delay {
            debug!(token = %entry.token, delay_ms = delay.as_millis() as u64, "Delaying stub response");
            tokio::time::sleep(delay).await;
        }
        match &entry.external_command {
            Some(command) => {
                let response = self.run_external(command, request).await?;
                self.check_external(entry, &response)?;
                Ok(response)
            }
            None => Ok(entry.response.materialize(self.contract.resolver())?),
        }
    }

    fn generate(&self, index: usize) -> Result<HttpResponse, PatternError> {
        let Some(operation) = self.contract.operation(index) else {
            return Ok(text_response(500, format!("No operation at index {index}")));
        };
        debug!(operation = %operation.id, "Generating response from contract");
        Ok(operation
            .response
            .generate(self.contract.resolver())?
            .with_header(GENERATED_HEADER, "true"))
    }

    /// Run an external response command with the request in its
    /// environment. At most `max_external_commands` run at once.
    async fn run_external(&self, command: &str, request: &HttpRequest) -> Result<HttpResponse, ResponseError> {
        let failed = |reason: String| ResponseError::Command {
            command: command.to_string(),
            reason,
        };
        let _permit = Arc::clone(&self.commands)
            .acquire_owned()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let command_line = command.to_string();
        let request_json = request.to_json().to_string();
        debug!(command, "Running external response command");
        let output = tokio::task::spawn_blocking(move || {
            shell(&command_line).env(REQUEST_ENV, request_json).output()
        })
        .await
        .map_err(|e| failed(e.to_string()))?
        .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            return Err(failed(format!(
                "exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_command_output(&String::from_utf8_lossy(&output.stdout)).map_err(failed)
    }

    fn check_external(&self, entry: &StubEntry, response: &HttpResponse) -> Result<(), ResponseError> {
        let Some(operation) = entry.operation.and_then(|i| self.contract.operation(i)) else {
            debug!(token = %entry.token, "No contract operation for stub, external command output not validated");
            return Ok(());
        };
        match operation.response.matches(response, self.contract.resolver())? {
            MatchResult::Success => Ok(()),
            MatchResult::Failure(failure) => Err(ResponseError::ContractViolation {
                report: failure.report(),
            }),
        }
    }

    /// Matching details for a request, without serving it.
    pub fn explain(&self, request: &HttpRequest) -> Result<serde_json::Value, PatternError> {
        let resolver = self.contract.resolver();
        let mut candidates = Vec::new();
        for entry in self.pool.snapshot().iter() {
            let specificity = entry.request.specificity();
            candidates.push(CandidateReport {
                token: entry.token.clone(),
                origin: entry.origin,
                seq: entry.seq,
                request: entry.request.to_string(),
                wildcards: specificity.wildcards(),
                constraints: specificity.constraints(),
                result: entry.request.matches(request, resolver)?.to_json(),
            });
        }
        let selected = match self.select(request)? {
            Selection::Stub(entry) => serde_json::json!({"kind": "stub", "token": entry.token}),
            Selection::Generated(index) => serde_json::json!({
                "kind": "generated",
                "operation": self.contract.operation(index).map(|op| op.id.clone()),
            }),
            Selection::NoMatch(failure) => serde_json::json!({
                "kind": "none",
                "report": failure.report(),
            }),
        };
        Ok(serde_json::json!({
            "debug": true,
            "mode": self.mode,
            "request": request.to_json(),
            "candidates": candidates,
            "selected": selected,
        }))
    }
}

/// A method or path-shape mismatch: the request was never aimed at this
/// stub or operation, so its failure is left out of reports.
fn off_route(result: &MatchResult) -> bool {
    result.entries().iter().any(|e| {
        matches!(
            e.reason,
            Some(FailureReason::MethodMismatch | FailureReason::PathMismatch)
        )
    })
}

fn no_match(message: String, misses: Vec<Failure>) -> Failure {
    if misses.is_empty() {
        Failure::new(message)
    } else {
        Failure::aggregate(message, misses)
    }
}

fn text_response(status: u16, text: String) -> HttpResponse {
    HttpResponse::new(status)
        .with_header("Content-Type", "text/plain")
        .with_body(text)
}

fn shell(command: &str) -> std::process::Command {
    if cfg!(windows) {
        let mut cmd = std::process::Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = std::process::Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

/// Read a command's stdout: either `{"http-response": {...}}` or the
/// response object itself.
fn parse_command_output(stdout: &str) -> Result<HttpResponse, String> {
    let mut json: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(|e| format!("output is not JSON: {e}"))?;
    if let Some(inner) = json.get_mut("http-response") {
        json = inner.take();
    }
    let document: StubResponseDocument =
        serde_json::from_value(json).map_err(|e| format!("output is not a response: {e}"))?;
    let response = document.to_response();
    for (name, value) in &response.headers {
        check_header(name, value)?;
    }
    Ok(response)
}
