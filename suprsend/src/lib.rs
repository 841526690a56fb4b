//! # suprsend: client for the SuprSend notification platform
//!
//! Builds HMAC-signed requests for triggering workflows, tracking events and editing users,
//! and splits large collections of records into size- and count-bounded chunks for the bulk
//! endpoints.
//!
//! ## Architecture
//!
//! ```text
//! Suprsend (client facade)
//!   ├─ BulkWorkflowTrigger / BulkEvents / BulkUsersEdit
//!   │    ├─ prepare + schema validation (SchemaCache)
//!   │    ├─ apparent size estimation (size)
//!   │    ├─ greedy chunking (chunker)
//!   │    └─ ChunkSender ── SignedRequest ── HttpClient
//!   └─ BulkResponse aggregation (bulk_response)
//! ```
//!
//! Chunks are sent one after another; a bulk trigger always attempts every chunk before
//! returning. Records that fail validation or exceed the per-record size limit are reported
//! in the response with code 500 rather than aborting the call.
//!
//! ## Usage
//!
//! ```ignore
//! use suprsend::{Event, Suprsend};
//! use serde_json::json;
//!
//! let client = Suprsend::new("workspace_key", "workspace_secret")?;
//! let mut bulk = client.bulk_events();
//! bulk.append((0..500).map(|i| {
//!     Event::new(format!("user-{i}"), "order_placed").with_properties(json!({"order": i}))
//! }))?;
//! let response = bulk.trigger().await?;
//! println!("{response}");
//! ```
//!
//! Configuration can also be loaded from YAML plus `SUPRSEND_`-prefixed environment
//! variables with [`ClientConfig::load`].

pub mod attachment;
pub mod bulk;
pub mod bulk_response;
pub mod chunker;
pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod schema;
pub mod sender;
pub mod signing;
pub mod size;
pub mod telemetry;

#[cfg(test)]
mod test;

pub use attachment::Attachment;
pub use bulk::{BulkEvents, BulkUsersEdit, BulkWorkflowTrigger, Event, UserEdit, WorkflowTriggerRequest};
pub use bulk_response::{BulkResponse, BulkStatus, ChunkResult, FailedRecord};
pub use chunker::ChunkLimits;
pub use client::Suprsend;
pub use config::{AppendMode, AttachmentPolicy, BulkLimits, ClientConfig};
pub use errors::{Error, Result};
pub use http::{HttpClient, ReqwestHttpClient};
pub use schema::SchemaCache;
pub use sender::ResponseMode;
