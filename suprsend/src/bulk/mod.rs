//! Bulk collections: validate, size, chunk and send records, then aggregate.
//!
//! ```text
//! BulkCollection::trigger()
//!   ├─ for each appended record:
//!   │    ├─ BulkRecord::prepare()          // final JSON + schema validation
//!   │    ├─ size::estimate()               // apparent size, per-record ceiling
//!   │    └─ record-scoped error → quarantined as invalid (code 500)
//!   ├─ merge invalid pseudo-chunk
//!   ├─ chunkify()
//!   └─ for each chunk, sequentially:
//!        ├─ ChunkSender::send()
//!        └─ BulkResponse::merge_chunk()
//! ```

pub mod events;
pub mod users;
pub mod workflows;

use std::sync::Arc;

use serde_json::Value;

use crate::bulk_response::{BulkResponse, ChunkResult, FailedRecord};
use crate::chunker::{Chunk, ChunkLimits, PendingRecord, chunkify};
use crate::config::{AppendMode, BulkLimits, ClientConfig};
use crate::errors::{Error, Result};
use crate::http::HttpClient;
use crate::schema::SchemaCache;
use crate::sender::{ChunkSender, ResponseMode};
use crate::size::{self, RecordKind};

pub use events::{BulkEvents, Event};
pub use users::{BulkUsersEdit, UserEdit};
pub use workflows::{BulkWorkflowTrigger, WorkflowTriggerRequest};

/// Shared state a record needs to produce its final JSON.
#[derive(Debug, Clone, Copy)]
pub struct RecordContext<'a> {
    pub config: &'a ClientConfig,
    pub schemas: &'a SchemaCache,
}

/// A domain object that can travel in a bulk request.
pub trait BulkRecord: Clone + Send + Sync {
    /// Record family, used for size estimation
    const KIND: RecordKind;

    /// Bulk endpoint URL for this family.
    fn endpoint(base_url: &str) -> String;

    /// Chunk limits for this family.
    fn limits(limits: &BulkLimits) -> ChunkLimits;

    /// Empty records are skipped (or rejected in strict mode) on append.
    fn is_empty(&self) -> bool;

    /// Validate and build the JSON payload that is sent.
    fn prepare(&self, ctx: &RecordContext<'_>) -> Result<Value>;

    /// Caller-facing JSON, used when reporting the record as failed.
    fn as_json(&self) -> Value;

    /// Non-fatal problems noticed while the record was built.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Prepare a record and compute its apparent size, enforcing the per-record ceiling.
pub(crate) fn admit<R: BulkRecord>(
    record: &R,
    index: usize,
    ctx: &RecordContext<'_>,
    limits: &ChunkLimits,
    is_part_of_bulk: bool,
) -> Result<PendingRecord> {
    let mut payload = record.prepare(ctx)?;
    let apparent_size = size::estimate(&payload, R::KIND, is_part_of_bulk, &ctx.config.attachments);
    if apparent_size > limits.record_ceiling() {
        return Err(Error::RecordTooLarge {
            index,
            size: apparent_size,
            limit: limits.record_ceiling(),
        });
    }
    if is_part_of_bulk && !ctx.config.attachments.allow_in_bulk {
        size::strip_attachments(&mut payload, R::KIND);
    }
    Ok(PendingRecord::new(payload, apparent_size))
}

/// Accumulates records of one family and sends them in size-bounded chunks.
pub struct BulkCollection<R: BulkRecord, C: HttpClient> {
    config: Arc<ClientConfig>,
    schemas: Arc<SchemaCache>,
    sender: ChunkSender<C>,
    limits: ChunkLimits,
    records: Vec<R>,
    chunks: Vec<Chunk>,
}

impl<R: BulkRecord, C: HttpClient> BulkCollection<R, C> {
    pub fn new(config: Arc<ClientConfig>, schemas: Arc<SchemaCache>, client: C) -> Self {
        let url = R::endpoint(&config.base_url);
        let limits = R::limits(&config.limits);
        Self {
            sender: ChunkSender::new(client, Arc::clone(&config), url, ResponseMode::AllOrNothing),
            config,
            schemas,
            limits,
            records: Vec::new(),
            chunks: Vec::new(),
        }
    }

    /// Interpret 2xx bodies with the given response mode.
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.sender = self.sender.with_mode(mode);
        self
    }

    /// Override the family's chunk limits for this collection.
    ///
    /// Fails with [`Error::Config`] for zero limits or a per-record limit above the chunk
    /// limit.
    pub fn with_limits(mut self, limits: ChunkLimits) -> Result<Self> {
        limits.validate(R::KIND.as_str())?;
        self.limits = limits;
        Ok(self)
    }

    pub fn limits(&self) -> &ChunkLimits {
        &self.limits
    }

    /// Queue records. The collection owns what it is given.
    ///
    /// In [`AppendMode::Strict`] an empty call or an empty record rejects the whole call
    /// and nothing is queued.
    pub fn append(&mut self, records: impl IntoIterator<Item = R>) -> Result<()> {
        let incoming: Vec<R> = records.into_iter().collect();
        let strict = self.config.append_mode == AppendMode::Strict;

        if strict {
            if incoming.is_empty() {
                return Err(Error::input("append called without records"));
            }
            if let Some(pos) = incoming.iter().position(|r| r.is_empty()) {
                return Err(Error::input(format!("record at position {pos} is empty")));
            }
        }

        self.records.extend(incoming.into_iter().filter(|r| !r.is_empty()));
        Ok(())
    }

    /// Number of records waiting for the next trigger.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Chunks sent by the last trigger, each with its response.
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Validate, chunk and send everything appended so far.
    ///
    /// Per-record problems end up in the response; only systemic errors (missing or broken
    /// schemas) are returned as `Err`.
    pub async fn trigger(&mut self) -> Result<BulkResponse> {
        let records = std::mem::take(&mut self.records);
        self.chunks.clear();

        let mut response = BulkResponse::new();
        let mut pending = Vec::with_capacity(records.len());
        let mut invalid = Vec::new();

        let ctx = RecordContext {
            config: &self.config,
            schemas: &self.schemas,
        };
        for (index, record) in records.iter().enumerate() {
            response.warnings.extend(record.warnings());
            match admit(record, index, &ctx, &self.limits, true) {
                Ok(admitted) => pending.push(admitted),
                Err(e) if e.is_record_scoped() => {
                    tracing::warn!(index = index, error = %e, "Record rejected before sending");
                    invalid.push(FailedRecord::invalid(record.as_json(), &e));
                }
                Err(e) => return Err(e),
            }
        }

        if !invalid.is_empty() {
            response.merge_chunk(&ChunkResult::invalid_records(invalid));
        }

        if pending.is_empty() {
            if response.status.is_none() {
                response.merge_chunk(&ChunkResult::empty_success());
            }
            return Ok(response);
        }

        let mut chunks = chunkify(pending, &self.limits)?;
        for (index, chunk) in chunks.iter_mut().enumerate() {
            tracing::debug!(
                chunk = index,
                records = chunk.len(),
                apparent_size = chunk.apparent_size(),
                "Triggering API call for chunk"
            );
            let result = self.sender.send(chunk.records()).await;
            response.merge_chunk(&result);
            chunk.set_response(result);
        }
        self.chunks = chunks;

        tracing::info!(%response, "Bulk call finished");
        Ok(response)
    }
}
