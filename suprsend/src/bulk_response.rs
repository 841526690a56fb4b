//! Per-chunk outcomes and their aggregation into one bulk response.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::Error;

/// Status of a chunk or of a whole bulk call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkStatus {
    Success,
    Partial,
    Fail,
}

impl BulkStatus {
    /// Fold an incoming status into the aggregate one.
    ///
    /// Mixed outcomes collapse to `Partial` and never leave it.
    pub fn merge(current: Option<BulkStatus>, incoming: BulkStatus) -> BulkStatus {
        use BulkStatus::*;
        match (current, incoming) {
            (None, incoming) => incoming,
            (Some(_), Partial) | (Some(Partial), _) => Partial,
            (Some(Success), Success) => Success,
            (Some(Fail), Fail) => Fail,
            (Some(Success), Fail) | (Some(Fail), Success) => Partial,
        }
    }

    /// Status implied by success/failure counts.
    pub fn from_counts(success: usize, failure: usize) -> BulkStatus {
        match (success, failure) {
            (_, 0) => BulkStatus::Success,
            (0, _) => BulkStatus::Fail,
            _ => BulkStatus::Partial,
        }
    }
}

impl fmt::Display for BulkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BulkStatus::Success => "success",
            BulkStatus::Partial => "partial",
            BulkStatus::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// A record that could not be delivered, with the reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub record: Value,
    pub error: String,
    pub code: u16,
}

impl FailedRecord {
    pub fn new(record: Value, error: impl Into<String>, code: u16) -> Self {
        Self {
            record,
            error: error.into(),
            code,
        }
    }

    /// A record rejected before it reached any chunk. Always carries code 500.
    pub fn invalid(record: Value, err: &Error) -> Self {
        Self::new(record, err.to_string(), 500)
    }
}

/// Outcome of sending one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkResult {
    pub status: BulkStatus,
    pub status_code: u16,
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub failed_records: Vec<FailedRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl ChunkResult {
    /// Result standing in for a bulk call with nothing to send.
    pub fn empty_success() -> Self {
        Self {
            status: BulkStatus::Success,
            status_code: 200,
            total: 0,
            success: 0,
            failure: 0,
            failed_records: Vec::new(),
            raw_response: None,
        }
    }

    /// Pseudo-chunk for records that failed validation.
    pub fn invalid_records(records: Vec<FailedRecord>) -> Self {
        Self {
            status: BulkStatus::Fail,
            status_code: 500,
            total: records.len(),
            success: 0,
            failure: records.len(),
            failed_records: records,
            raw_response: None,
        }
    }

    pub fn all_succeeded(total: usize, status_code: u16, raw_response: Option<String>) -> Self {
        Self {
            status: BulkStatus::Success,
            status_code,
            total,
            success: total,
            failure: 0,
            failed_records: Vec::new(),
            raw_response,
        }
    }

    pub fn all_failed(records: &[Value], status_code: u16, error: &str, raw_response: Option<String>) -> Self {
        Self {
            status: BulkStatus::Fail,
            status_code,
            total: records.len(),
            success: 0,
            failure: records.len(),
            failed_records: records
                .iter()
                .map(|r| FailedRecord::new(r.clone(), error, status_code))
                .collect(),
            raw_response,
        }
    }
}

/// Aggregate outcome of one bulk `trigger()`/`save()` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkResponse {
    /// `None` until the first chunk is merged
    pub status: Option<BulkStatus>,
    pub failed_records: Vec<FailedRecord>,
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub warnings: Vec<String>,
}

impl BulkResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_chunk(&mut self, chunk: &ChunkResult) {
        self.status = Some(BulkStatus::merge(self.status, chunk.status));
        self.total += chunk.total;
        self.success += chunk.success;
        self.failure += chunk.failure;
        self.failed_records.extend(chunk.failed_records.iter().cloned());
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(BulkStatus::Success)
    }
}

impl fmt::Display for BulkResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "BulkResponse<status: {} | total: {} | success: {} | failure: {} | warnings: {}>",
            status,
            self.total,
            self.success,
            self.failure,
            self.warnings.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    use super::BulkStatus::*;

    #[rstest]
    #[case(None, Success, Success)]
    #[case(None, Partial, Partial)]
    #[case(None, Fail, Fail)]
    #[case(Some(Success), Success, Success)]
    #[case(Some(Success), Partial, Partial)]
    #[case(Some(Success), Fail, Partial)]
    #[case(Some(Partial), Success, Partial)]
    #[case(Some(Partial), Partial, Partial)]
    #[case(Some(Partial), Fail, Partial)]
    #[case(Some(Fail), Success, Partial)]
    #[case(Some(Fail), Partial, Partial)]
    #[case(Some(Fail), Fail, Fail)]
    fn test_status_transitions(#[case] current: Option<BulkStatus>, #[case] incoming: BulkStatus, #[case] expected: BulkStatus) {
        assert_eq!(BulkStatus::merge(current, incoming), expected);
    }

    #[rstest]
    #[case(3, 0, Success)]
    #[case(0, 0, Success)]
    #[case(0, 2, Fail)]
    #[case(1, 2, Partial)]
    fn test_status_from_counts(#[case] success: usize, #[case] failure: usize, #[case] expected: BulkStatus) {
        assert_eq!(BulkStatus::from_counts(success, failure), expected);
    }

    #[test]
    fn test_counts_are_additive() {
        let records = vec![json!({"a": 1}), json!({"a": 2})];
        let mut resp = BulkResponse::new();
        resp.merge_chunk(&ChunkResult::all_succeeded(3, 202, None));
        resp.merge_chunk(&ChunkResult::all_failed(&records, 400, "bad request", None));

        assert_eq!(resp.status, Some(Partial));
        assert_eq!(resp.total, 5);
        assert_eq!(resp.success, 3);
        assert_eq!(resp.failure, 2);
        assert_eq!(resp.failed_records.len(), 2);
        assert_eq!(resp.failed_records[1].record, json!({"a": 2}));
        assert_eq!(resp.failed_records[1].code, 400);
    }

    #[test]
    fn test_fail_never_reverts_after_success() {
        let mut resp = BulkResponse::new();
        resp.merge_chunk(&ChunkResult::all_succeeded(1, 200, None));
        resp.merge_chunk(&ChunkResult::all_failed(&[json!({})], 500, "boom", None));
        resp.merge_chunk(&ChunkResult::all_failed(&[json!({})], 500, "boom", None));
        assert_eq!(resp.status, Some(Partial));
    }

    #[test]
    fn test_invalid_records_chunk_then_success_is_partial() {
        let err = Error::input("distinct_id missing");
        let invalid = vec![FailedRecord::invalid(json!({"event": "x"}), &err)];

        let mut resp = BulkResponse::new();
        resp.merge_chunk(&ChunkResult::invalid_records(invalid));
        resp.merge_chunk(&ChunkResult::all_succeeded(4, 202, None));

        assert_eq!(resp.status, Some(Partial));
        assert_eq!(resp.failed_records[0].code, 500);
        assert_eq!(resp.failed_records[0].error, "distinct_id missing");
    }

    #[test]
    fn test_empty_success() {
        let mut resp = BulkResponse::new();
        assert_eq!(resp.status, None);
        resp.merge_chunk(&ChunkResult::empty_success());
        assert!(resp.is_success());
        assert_eq!((resp.total, resp.success, resp.failure), (0, 0, 0));
    }

    #[test]
    fn test_display_and_serialization() {
        let mut resp = BulkResponse::new();
        resp.merge_chunk(&ChunkResult::all_succeeded(2, 200, None));
        resp.warnings.push("[distinct_id: u1] skipping key".to_string());

        assert_eq!(
            resp.to_string(),
            "BulkResponse<status: success | total: 2 | success: 2 | failure: 0 | warnings: 1>"
        );
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["total"], 2);
    }
}
