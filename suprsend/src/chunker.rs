//! Greedy bin-packing of sized records into count- and byte-bounded chunks.
//!
//! Records are admitted in input order. A chunk stops accepting records once it is at
//! (or over) either threshold, or when the next record would push it past the byte
//! ceiling; the record is then carried to a fresh chunk. Chunk boundaries never reorder
//! records.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bulk_response::ChunkResult;
use crate::errors::{Error, Result};

/// Limits for one endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkLimits {
    /// Maximum number of records per chunk
    pub max_records: usize,
    /// Maximum cumulative apparent size per chunk, in bytes
    pub max_bytes: usize,
    /// Maximum apparent size of a single record, in bytes
    pub max_record_bytes: usize,
}

impl ChunkLimits {
    pub fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            max_records,
            max_bytes,
            max_record_bytes: max_bytes,
        }
    }

    pub fn with_max_record_bytes(mut self, max_record_bytes: usize) -> Self {
        self.max_record_bytes = max_record_bytes;
        self
    }

    /// Largest apparent size a single record may have: never above the chunk ceiling.
    pub fn record_ceiling(&self) -> usize {
        self.max_record_bytes.min(self.max_bytes)
    }

    pub(crate) fn validate(&self, family: &str) -> Result<()> {
        if self.max_records == 0 {
            return Err(Error::config(format!("{family}: max_records must be at least 1")));
        }
        if self.max_bytes == 0 {
            return Err(Error::config(format!("{family}: max_bytes must be at least 1")));
        }
        if self.max_record_bytes > self.max_bytes {
            return Err(Error::config(format!(
                "{family}: max_record_bytes ({}) cannot be greater than max_bytes ({})",
                self.max_record_bytes, self.max_bytes
            )));
        }
        Ok(())
    }
}

/// A validated record together with its apparent size.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub payload: Value,
    pub size: usize,
}

impl PendingRecord {
    pub fn new(payload: Value, size: usize) -> Self {
        Self { payload, size }
    }
}

/// An ordered batch of records sent in a single HTTP call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    records: Vec<Value>,
    running_size: usize,
    running_length: usize,
    response: Option<ChunkResult>,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[Value] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.running_length
    }

    pub fn is_empty(&self) -> bool {
        self.running_length == 0
    }

    /// Sum of the apparent sizes of the admitted records.
    pub fn apparent_size(&self) -> usize {
        self.running_size
    }

    /// Outcome of sending this chunk, once it has been sent.
    pub fn response(&self) -> Option<&ChunkResult> {
        self.response.as_ref()
    }

    pub(crate) fn set_response(&mut self, response: ChunkResult) {
        self.response = Some(response);
    }

    fn limit_reached(&self, limits: &ChunkLimits) -> bool {
        self.running_length >= limits.max_records || self.running_size >= limits.max_bytes
    }

    fn add(&mut self, payload: Value, size: usize) {
        // size first, then the record
        self.running_size += size;
        self.records.push(payload);
        self.running_length += 1;
    }
}

/// Null, `{}` and `[]` payloads are admitted as no-ops.
fn is_blank(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Partition records into chunks.
///
/// Returns no chunks for empty input. Fails with [`Error::RecordTooLarge`] as soon as a
/// record bigger than `max_record_bytes` is reached.
pub fn chunkify(records: impl IntoIterator<Item = PendingRecord>, limits: &ChunkLimits) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    let mut current = Chunk::new();

    for (index, record) in records.into_iter().enumerate() {
        if is_blank(&record.payload) {
            continue;
        }

        if current.limit_reached(limits) && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if record.size > limits.record_ceiling() {
            return Err(Error::RecordTooLarge {
                index,
                size: record.size,
                limit: limits.record_ceiling(),
            });
        }

        if current.running_size + record.size > limits.max_bytes && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        current.add(record.payload, record.size);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    tracing::trace!(chunks = chunks.len(), "Chunked records");
    Ok(chunks)
}
