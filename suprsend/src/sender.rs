//! Chunk transmission: sign, POST, map the outcome.
//!
//! ```text
//! ChunkSender::send(records)
//!   ├─ body = JSON array of records
//!   ├─ SignedRequest::build()      // Content-Type, Date, User-Agent, Authorization
//!   ├─ HttpClient::execute()
//!   └─ outcome
//!        ├─ transport error → fail / 500, every record failed
//!        ├─ 2xx            → success (or per-record mapping)
//!        └─ other status   → fail / status, every record failed
//! ```
//!
//! Sending never returns an error: every outcome is a [`ChunkResult`].

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::bulk_response::{BulkStatus, ChunkResult, FailedRecord};
use crate::config::ClientConfig;
use crate::http::{HttpClient, HttpResponse, SignedRequest};

/// How a 2xx response body reports record outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseMode {
    /// Status code only: 2xx means every record was accepted
    #[default]
    AllOrNothing,
    /// Body carries `{"records": [{"status", "status_code", "error": {"message"}}]}`
    PerRecord,
}

#[derive(Debug, Default, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    records: Vec<RecordOutcome>,
}

#[derive(Debug, Deserialize)]
struct RecordOutcome {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    error: Option<RecordError>,
}

#[derive(Debug, Deserialize)]
struct RecordError {
    #[serde(default)]
    message: Option<String>,
}

impl RecordOutcome {
    fn failed(&self) -> bool {
        matches!(self.status.as_deref(), Some("fail" | "failure" | "error"))
    }
}

/// Sends chunks of records to one bulk endpoint.
#[derive(Clone)]
pub struct ChunkSender<C: HttpClient> {
    client: C,
    config: Arc<ClientConfig>,
    url: String,
    mode: ResponseMode,
}

impl<C: HttpClient> ChunkSender<C> {
    pub fn new(client: C, config: Arc<ClientConfig>, url: impl Into<String>, mode: ResponseMode) -> Self {
        Self {
            client,
            config,
            url: url.into(),
            mode,
        }
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    /// Send a chunk as one JSON array body.
    #[tracing::instrument(skip(self, records), fields(url = %self.url, records = records.len()))]
    pub async fn send(&self, records: &[Value]) -> ChunkResult {
        let body = Value::Array(records.to_vec());
        self.dispatch(&body, records).await
    }

    /// Send a single record as a JSON object body.
    #[tracing::instrument(skip(self, record), fields(url = %self.url))]
    pub async fn send_one(&self, record: &Value) -> ChunkResult {
        self.dispatch(record, std::slice::from_ref(record)).await
    }

    async fn dispatch(&self, body: &Value, records: &[Value]) -> ChunkResult {
        let request = match SignedRequest::build("POST", &self.url, Some(body), &self.config, Utc::now()) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to sign request");
                return ChunkResult::all_failed(records, 500, &e.to_string(), None);
            }
        };

        if self.config.debug {
            tracing::debug!(body_len = request.body.len(), date = ?request.header("Date"), "Sending signed request");
        }

        match self.client.execute(&request).await {
            Err(e) => {
                tracing::warn!(error = %e, "Chunk send failed");
                ChunkResult::all_failed(records, 500, &e.to_string(), None)
            }
            Ok(response) if response.is_success() => {
                tracing::debug!(status = response.status, "Chunk accepted");
                match self.mode {
                    ResponseMode::AllOrNothing => ChunkResult::all_succeeded(records.len(), response.status, Some(response.body)),
                    ResponseMode::PerRecord => map_per_record(records, response),
                }
            }
            Ok(response) => {
                let message = error_message(&response.body);
                tracing::warn!(status = response.status, error = %message, "Chunk rejected");
                ChunkResult::all_failed(records, response.status, &message, Some(response.body))
            }
        }
    }
}

/// Error text from a rejected response: `message`, `detail` or `error.message` when the
/// body is JSON, otherwise the raw body.
pub(crate) fn error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    parsed
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| parsed.get("detail").and_then(Value::as_str))
        .or_else(|| parsed.pointer("/error/message").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

fn map_per_record(records: &[Value], response: HttpResponse) -> ChunkResult {
    let reported = serde_json::from_str::<RecordsResponse>(&response.body).unwrap_or_default().records;
    if reported.len() < records.len() {
        tracing::debug!(
            reported = reported.len(),
            sent = records.len(),
            "Unreported records treated as accepted"
        );
    }

    let mut success = 0;
    let mut failed_records = Vec::new();
    for (i, record) in records.iter().enumerate() {
        match reported.get(i) {
            Some(outcome) if outcome.failed() => {
                let message = outcome
                    .error
                    .as_ref()
                    .and_then(|e| e.message.clone())
                    .unwrap_or_else(|| "unknown error".to_string());
                failed_records.push(FailedRecord::new(record.clone(), message, outcome.status_code.unwrap_or(500)));
            }
            _ => success += 1,
        }
    }

    let failure = failed_records.len();
    ChunkResult {
        status: BulkStatus::from_counts(success, failure),
        status_code: response.status,
        total: records.len(),
        success,
        failure,
        failed_records,
        raw_response: Some(response.body),
    }
}
