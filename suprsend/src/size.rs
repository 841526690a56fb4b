//! Apparent-size estimation used for batching decisions.
//!
//! The apparent size is the compact UTF-8 JSON length of a record, adjusted for keys the
//! backend adds in flight and for how attachments will travel:
//!
//! - bulk request with attachments disallowed: `$attachments` is left out entirely
//! - auto-upload enabled: each attachment's inline `data` is left out and replaced by a
//!   fixed URL-reference estimate
//! - otherwise inline attachment bytes count fully

use serde_json::Value;

use crate::config::AttachmentPolicy;

/// URLs generally stay within 2048 UTF-8 bytes
pub const ATTACHMENT_URL_POTENTIAL_SIZE_IN_BYTES: usize = 2100;

/// Keys added in flight to every workflow body
pub const WORKFLOW_RUNTIME_KEYS_POTENTIAL_SIZE_IN_BYTES: usize = 200;

pub const ATTACHMENTS_KEY: &str = "$attachments";

/// Record family, deciding where attachments live and the in-flight overhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    WorkflowTrigger,
    Event,
    UserEdit,
    ListBroadcast,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::WorkflowTrigger => "workflows",
            RecordKind::Event => "events",
            RecordKind::UserEdit => "users",
            RecordKind::ListBroadcast => "list_broadcast",
        }
    }

    /// Object holding the `$attachments` list, if the family supports attachments.
    pub fn attachments_parent(&self) -> Option<&'static str> {
        match self {
            RecordKind::WorkflowTrigger => Some("data"),
            RecordKind::Event => Some("properties"),
            RecordKind::UserEdit | RecordKind::ListBroadcast => None,
        }
    }

    pub fn runtime_overhead(&self) -> usize {
        match self {
            RecordKind::WorkflowTrigger => WORKFLOW_RUNTIME_KEYS_POTENTIAL_SIZE_IN_BYTES,
            _ => 0,
        }
    }
}

/// Byte length of the compact JSON serialization.
pub fn json_size(record: &Value) -> usize {
    serde_json::to_vec(record).map(|bytes| bytes.len()).unwrap_or(0)
}

fn attachment_count(record: &Value, parent: &str) -> usize {
    record
        .get(parent)
        .and_then(|p| p.get(ATTACHMENTS_KEY))
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Apparent size of a record. Never mutates `record`.
pub fn estimate(record: &Value, kind: RecordKind, is_part_of_bulk: bool, policy: &AttachmentPolicy) -> usize {
    let overhead = kind.runtime_overhead();
    let Some(parent) = kind.attachments_parent() else {
        return json_size(record) + overhead;
    };

    let num_attachments = attachment_count(record, parent);
    if num_attachments == 0 {
        return json_size(record) + overhead;
    }

    if is_part_of_bulk && !policy.allow_in_bulk {
        let mut apparent = record.clone();
        strip_attachments(&mut apparent, kind);
        return json_size(&apparent) + overhead;
    }

    if policy.upload_enabled {
        let mut apparent = record.clone();
        if let Some(list) = apparent
            .get_mut(parent)
            .and_then(|p| p.get_mut(ATTACHMENTS_KEY))
            .and_then(Value::as_array_mut)
        {
            for attachment in list.iter_mut() {
                if let Some(obj) = attachment.as_object_mut() {
                    obj.remove("data");
                }
            }
        }
        return json_size(&apparent) + overhead + num_attachments * ATTACHMENT_URL_POTENTIAL_SIZE_IN_BYTES;
    }

    json_size(record) + overhead
}

/// Remove the `$attachments` list from a record, if present.
pub fn strip_attachments(record: &mut Value, kind: RecordKind) {
    if let Some(parent) = kind.attachments_parent()
        && let Some(obj) = record.get_mut(parent).and_then(Value::as_object_mut)
    {
        obj.remove(ATTACHMENTS_KEY);
    }
}

pub fn workflow_body_size(body: &Value, is_part_of_bulk: bool, policy: &AttachmentPolicy) -> usize {
    estimate(body, RecordKind::WorkflowTrigger, is_part_of_bulk, policy)
}

pub fn event_size(event: &Value, is_part_of_bulk: bool, policy: &AttachmentPolicy) -> usize {
    estimate(event, RecordKind::Event, is_part_of_bulk, policy)
}

pub fn user_payload_size(payload: &Value) -> usize {
    json_size(payload)
}

pub fn list_broadcast_body_size(body: &Value) -> usize {
    json_size(body)
}
