//! Contract-validated HTTP stub server.
//!
//! A [`Contract`] declares named types and request/response operations. Stub
//! files (and stubs registered over the admin API) are validated against it
//! and kept in a [`StubPool`]; the [`StubEngine`] matches each incoming
//! request against a snapshot of the pool, picks the most specific stub and
//! shapes its response. When no stub matches, strict mode answers with a
//! failure report and lenient mode generates a response from the contract.

pub mod admin;
pub mod config;
pub mod contract;
pub mod engine;
pub mod error;
pub mod handler;
pub mod http;
pub mod pattern;
pub mod pool;
pub mod server;
pub mod stub;
pub mod telemetry;

pub use config::{LogFormat, ServerConfig};
pub use contract::{Contract, Operation};
pub use engine::{LoadSummary, MatchMode, Selection, StubEngine};
pub use error::{ContractError, ResponseError, ServerError, StubError};
pub use http::{HttpRequest, HttpResponse};
pub use pattern::{HttpRequestPattern, HttpResponsePattern, PathPattern, Specificity};
pub use pool::StubPool;
pub use server::StubServer;
pub use stub::{StubDocument, StubEntry, StubOrigin};
pub use telemetry::{FanoutSink, InteractionRecord, MemorySink, TelemetrySink, TracingSink};
