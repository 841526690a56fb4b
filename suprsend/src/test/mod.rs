//! End-to-end scenarios: real reqwest client, wiremock server, full bulk pipeline.

pub mod utils;

use serde_json::{Value, json};
use wiremock::matchers::{header, header_exists, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::bulk::UserEdit;
use crate::bulk_response::BulkStatus;
use crate::chunker::ChunkLimits;
use crate::client::Suprsend;
use crate::http::CONTENT_TYPE_JSON;
use crate::sender::ResponseMode;
use utils::{create_test_client, create_test_config, padded_event, received_batches, workflow};

async fn accept_all(server: &MockServer, endpoint: &str) {
    Mock::given(method("POST"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({"success": true})))
        .mount(server)
        .await;
}

#[test_log::test(tokio::test)]
async fn test_bulk_events_split_by_record_count() {
    let server = MockServer::start().await;
    accept_all(&server, "/event/").await;

    let client = create_test_client(&server);
    let mut bulk = client.bulk_events().with_limits(ChunkLimits::new(10, 1_000_000)).unwrap();
    bulk.append((0..25).map(|i| padded_event(i, 10_000))).unwrap();

    let response = bulk.trigger().await.unwrap();
    assert_eq!(response.status, Some(BulkStatus::Success));
    assert_eq!((response.total, response.success, response.failure), (25, 25, 0));

    let sizes: Vec<usize> = bulk.chunks().iter().map(|c| c.len()).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(bulk.chunks().iter().all(|c| c.response().is_some()));

    // input order survives chunking
    let seqs: Vec<i64> = received_batches(&server)
        .await
        .into_iter()
        .flatten()
        .map(|event| event["properties"]["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, (0..25).collect::<Vec<i64>>());
}

#[test_log::test(tokio::test)]
async fn test_oversized_record_is_reported_and_others_are_sent() {
    let server = MockServer::start().await;
    accept_all(&server, "/trigger/").await;

    let client = create_test_client(&server);
    let mut bulk = client.bulk_workflows().with_limits(ChunkLimits::new(100, 800 * 1024)).unwrap();
    bulk.append([
        workflow(0, json!({"n": 0})),
        workflow(1, json!({"blob": "x".repeat(2 * 1024 * 1024)})),
        workflow(2, json!({"n": 2})),
        workflow(3, json!({"n": 3})),
    ])
    .unwrap();

    let response = bulk.trigger().await.unwrap();
    assert_eq!(response.status, Some(BulkStatus::Partial));
    assert_eq!((response.total, response.success, response.failure), (4, 3, 1));

    let failed = &response.failed_records[0];
    assert_eq!(failed.code, 500);
    assert!(failed.error.starts_with("record 1 too big"), "{}", failed.error);
    assert!(failed.error.ends_with("must not cross 819200 Bytes"), "{}", failed.error);

    let batches = received_batches(&server).await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
}

#[test_log::test(tokio::test)]
async fn test_connection_error_fails_every_record() {
    let client = Suprsend::from_config(create_test_config("http://127.0.0.1:1/")).unwrap();
    let mut bulk = client.bulk_events().with_limits(ChunkLimits::new(2, 1_000_000)).unwrap();
    bulk.append((0..5).map(|i| padded_event(i, 10))).unwrap();

    let response = bulk.trigger().await.unwrap();
    assert_eq!(response.status, Some(BulkStatus::Fail));
    assert_eq!((response.total, response.success, response.failure), (5, 0, 5));
    assert_eq!(response.failed_records.len(), 5);
    for failed in &response.failed_records {
        assert_eq!(failed.code, 500);
        assert!(!failed.error.is_empty());
    }
    // every chunk was still attempted
    assert_eq!(bulk.chunks().len(), 3);
}

#[test_log::test(tokio::test)]
async fn test_empty_input_sends_nothing() {
    let server = MockServer::start().await;
    let client = create_test_client(&server);

    let mut bulk = client.bulk_users();
    bulk.append(Vec::<UserEdit>::new()).unwrap();
    let response = bulk.save().await.unwrap();

    assert_eq!(response.status, Some(BulkStatus::Success));
    assert_eq!((response.total, response.success, response.failure), (0, 0, 0));
    assert!(bulk.chunks().is_empty());
    assert!(received_batches(&server).await.is_empty());
}

#[test_log::test(tokio::test)]
async fn test_one_rejected_chunk_makes_response_partial() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/event/"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/event/"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "rate limited"})))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let mut bulk = client.bulk_events().with_limits(ChunkLimits::new(3, 1_000_000)).unwrap();
    bulk.append((0..5).map(|i| padded_event(i, 10))).unwrap();

    let response = bulk.trigger().await.unwrap();
    assert_eq!(response.status, Some(BulkStatus::Partial));
    assert_eq!((response.total, response.success, response.failure), (5, 3, 2));
    assert!(response.failed_records.iter().all(|f| f.code == 429 && f.error == "rate limited"));
    assert_eq!(response.failed_records[0].record["properties"]["seq"], 3);
}

#[test_log::test(tokio::test)]
async fn test_per_record_response_mode() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trigger/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                {"status": "success", "status_code": 202},
                {"status": "fail", "status_code": 400, "error": {"message": "unknown workflow"}},
            ]
        })))
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let mut bulk = client.bulk_workflows().with_response_mode(ResponseMode::PerRecord);
    bulk.append([workflow(0, json!({})), workflow(1, json!({}))]).unwrap();

    let response = bulk.trigger().await.unwrap();
    assert_eq!(response.status, Some(BulkStatus::Partial));
    assert_eq!((response.success, response.failure), (1, 1));
    assert_eq!(response.failed_records[0].error, "unknown workflow");
    assert_eq!(response.failed_records[0].code, 400);
}

#[test_log::test(tokio::test)]
async fn test_requests_carry_signed_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/event/"))
        .and(header("Content-Type", CONTENT_TYPE_JSON))
        .and(header_regex("Authorization", "^ws_key:[A-Za-z0-9+/]+=*$"))
        .and(header_regex("Date", r"^[A-Z][a-z]{2}, \d{2} [A-Z][a-z]{2} \d{4} \d{2}:\d{2}:\d{2} GMT$"))
        .and(header_regex("User-Agent", "^suprsend/"))
        .and(header_exists("Date"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let client = create_test_client(&server);
    let mut bulk = client.bulk_events();
    bulk.append([padded_event(0, 10)]).unwrap();

    let response = bulk.trigger().await.unwrap();
    assert!(response.is_success(), "{response}");
}

#[test_log::test(tokio::test)]
async fn test_user_warnings_and_invalid_records() {
    let server = MockServer::start().await;
    accept_all(&server, "/event/").await;

    let mut valid = UserEdit::new("u1");
    valid.set("name", "Ada").add_email("ada@example.com");
    let mut noisy = UserEdit::new("u2");
    noisy.add_email("not-an-email").set("plan", "pro");
    let mut missing_id = UserEdit::new(" ");
    missing_id.set("plan", "pro");

    let client = create_test_client(&server);
    let mut bulk = client.bulk_users();
    bulk.append([valid, noisy, missing_id]).unwrap();
    let response = bulk.save().await.unwrap();

    assert_eq!(response.status, Some(BulkStatus::Partial));
    assert_eq!((response.total, response.success, response.failure), (3, 2, 1));
    assert_eq!(response.failed_records[0].error, "distinct_id missing");
    assert_eq!(response.warnings.len(), 1);
    assert!(response.warnings[0].starts_with("[distinct_id: u2]"));

    let batches = received_batches(&server).await;
    let sent: Vec<&Value> = batches.iter().flatten().collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0]["$schema"], "2");
    assert_eq!(sent[0]["$user_operations"][1], json!({"$append": {"$email": "ada@example.com"}}));
}

#[test_log::test(tokio::test)]
async fn test_trigger_drains_pending_records() {
    let server = MockServer::start().await;
    accept_all(&server, "/event/").await;

    let client = create_test_client(&server);
    let mut bulk = client.bulk_events();
    bulk.append([padded_event(0, 10)]).unwrap();
    assert_eq!(bulk.len(), 1);

    bulk.trigger().await.unwrap();
    assert!(bulk.is_empty());

    let second = bulk.trigger().await.unwrap();
    assert_eq!(second.total, 0);
    assert_eq!(received_batches(&server).await.len(), 1);
}
