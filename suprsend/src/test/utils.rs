use serde_json::{Value, json};
use wiremock::MockServer;

use crate::bulk::{Event, WorkflowTriggerRequest};
use crate::client::Suprsend;
use crate::config::ClientConfig;

pub fn create_test_config(base_url: &str) -> ClientConfig {
    ClientConfig::new("ws_key", "ws_secret").with_base_url(base_url)
}

/// Real reqwest-backed client pointed at a wiremock server.
pub fn create_test_client(server: &MockServer) -> Suprsend {
    Suprsend::from_config(create_test_config(&server.uri())).unwrap()
}

/// Event whose properties carry roughly `approx_bytes` of payload.
pub fn padded_event(i: usize, approx_bytes: usize) -> Event {
    Event::new(format!("user-{i}"), "report_ready").with_properties(json!({
        "seq": i,
        "blob": "x".repeat(approx_bytes),
    }))
}

pub fn workflow(i: usize, data: Value) -> WorkflowTriggerRequest {
    WorkflowTriggerRequest::new(json!({
        "workflow": "order-shipped",
        "recipients": [format!("user-{i}")],
        "data": data,
    }))
}

/// Bodies of every request the server received, parsed as JSON arrays.
pub async fn received_batches(server: &MockServer) -> Vec<Vec<Value>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|req| serde_json::from_slice::<Vec<Value>>(&req.body).unwrap())
        .collect()
}
