//! Workflow trigger requests and their bulk collection.

use serde_json::Value;

use super::{BulkCollection, BulkRecord, RecordContext};
use crate::attachment::{self, Attachment};
use crate::chunker::ChunkLimits;
use crate::config::BulkLimits;
use crate::errors::{Error, Result};
use crate::http::ReqwestHttpClient;
use crate::schema::SchemaName;
use crate::size::RecordKind;

/// Bulk collection of workflow triggers, sent to `{base_url}trigger/`.
pub type BulkWorkflowTrigger<C = ReqwestHttpClient> = BulkCollection<WorkflowTriggerRequest, C>;

/// A workflow body plus the request-level keys that travel with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowTriggerRequest {
    pub body: Value,
    pub idempotency_key: Option<String>,
    pub tenant_id: Option<String>,
    pub cancellation_key: Option<String>,
}

impl WorkflowTriggerRequest {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            ..Default::default()
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_cancellation_key(mut self, key: impl Into<String>) -> Self {
        self.cancellation_key = Some(key.into());
        self
    }

    /// Attach a file under `data.$attachments`.
    ///
    /// Ignored with a warning when `data` is not an object.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        if !attachment::push_attachment(&mut self.body, "data", &attachment) {
            tracing::warn!("Attachment not added: body.data must be a JSON object");
        }
    }

    fn with_request_keys(&self) -> Value {
        let mut body = self.body.clone();
        if let Some(obj) = body.as_object_mut() {
            let keys = [
                ("$idempotency_key", &self.idempotency_key),
                ("tenant_id", &self.tenant_id),
                ("cancellation_key", &self.cancellation_key),
            ];
            for (name, value) in keys {
                if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                    obj.insert(name.to_string(), Value::from(value));
                }
            }
        }
        body
    }
}

impl From<Value> for WorkflowTriggerRequest {
    fn from(body: Value) -> Self {
        Self::new(body)
    }
}

impl BulkRecord for WorkflowTriggerRequest {
    const KIND: RecordKind = RecordKind::WorkflowTrigger;

    fn endpoint(base_url: &str) -> String {
        format!("{base_url}trigger/")
    }

    fn limits(limits: &BulkLimits) -> ChunkLimits {
        limits.workflows
    }

    fn is_empty(&self) -> bool {
        match &self.body {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    fn prepare(&self, ctx: &RecordContext<'_>) -> Result<Value> {
        if !self.body.is_object() {
            return Err(Error::input("WorkflowTriggerRequest body must be a JSON object"));
        }
        ctx.schemas.validate(self.with_request_keys(), SchemaName::WorkflowTrigger)
    }

    fn as_json(&self) -> Value {
        self.with_request_keys()
    }
}
