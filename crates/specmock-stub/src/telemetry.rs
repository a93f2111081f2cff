//! Interaction records and the sinks that receive them.
//!
//! The server does not log interactions through a global; it is handed an
//! `Arc<dyn TelemetrySink>` at construction.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::info;

/// Outcome of one served interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    pub path: String,
    pub method: String,
    pub response_status: u16,
    /// `success` or `failure`.
    pub result: String,
    /// Contract source or stub token that produced the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
    pub duration_ms: u64,
    pub timestamp: String,
    /// Failure report, when the interaction failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub trait TelemetrySink: Send + Sync {
    fn record(&self, record: &InteractionRecord);

    /// Most recent records, oldest first. Sinks that do not retain
    /// records return nothing.
    fn recent(&self) -> Vec<InteractionRecord> {
        Vec::new()
    }
}

/// Emits one `info!` event per interaction.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&self, record: &InteractionRecord) {
        info!(
            method = %record.method,
            path = %record.path,
            status = record.response_status,
            result = %record.result,
            specification = record.specification.as_deref().unwrap_or("-"),
            duration_ms = record.duration_ms,
            "Interaction"
        );
    }
}

/// Keeps the last `capacity` records in memory.
#[derive(Debug)]
pub struct MemorySink {
    records: Mutex<VecDeque<InteractionRecord>>,
    capacity: usize,
}

impl MemorySink {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
        }
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl TelemetrySink for MemorySink {
    fn record(&self, record: &InteractionRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
    }

    fn recent(&self) -> Vec<InteractionRecord> {
        self.records.lock().iter().cloned().collect()
    }
}

/// Forwards every record to each inner sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for FanoutSink {
    fn record(&self, record: &InteractionRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }

    /// Records from the first sink that keeps any.
    fn recent(&self) -> Vec<InteractionRecord> {
        self.sinks
            .iter()
            .map(|s| s.recent())
            .find(|r| !r.is_empty())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> InteractionRecord {
        InteractionRecord {
            path: path.to_string(),
            method: "GET".to_string(),
            response_status: 200,
            result: "success".to_string(),
            specification: None,
            duration_ms: 1,
            timestamp: chrono::Utc::now().to_rfc3339(),
            details: None,
        }
    }

    #[test]
    fn test_memory_sink_is_bounded() {
        let sink = MemorySink::new(2);
        sink.record(&record("/a"));
        sink.record(&record("/b"));
        sink.record(&record("/c"));
        let paths: Vec<String> = sink.recent().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["/b", "/c"]);
    }

    #[test]
    fn test_fanout_reports_retained_records() {
        let memory = Arc::new(MemorySink::default());
        let sinks: Vec<Arc<dyn TelemetrySink>> = vec![Arc::new(TracingSink), memory.clone()];
        let fanout = FanoutSink::new(sinks);
        fanout.record(&record("/a"));
        assert_eq!(memory.recent().len(), 1);
        assert_eq!(fanout.recent()[0].path, "/a");
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let json = serde_json::to_value(record("/a")).unwrap();
        assert_eq!(json["responseStatus"], 200);
        assert!(json.get("details").is_none());
    }
}
