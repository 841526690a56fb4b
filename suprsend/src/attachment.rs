//! Attachment values carried in `$attachments` lists.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::size::ATTACHMENTS_KEY;

/// A file reference or an inline base64 payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: Option<String>,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
    /// base64-encoded content
    pub data: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub ignore_if_error: bool,
}

impl Attachment {
    /// Attachment fetched by the backend from a public URL.
    pub fn from_url(url: impl Into<String>, filename: Option<String>) -> Self {
        Self {
            filename,
            content_type: None,
            data: None,
            url: Some(url.into()),
            ignore_if_error: false,
        }
    }

    /// Attachment with its content inline.
    pub fn inline(filename: impl Into<String>, content_type: impl Into<String>, bytes: &[u8]) -> Self {
        let filename = filename.into();
        let filename = filename.trim();
        Self {
            filename: (!filename.is_empty()).then(|| filename.to_string()),
            content_type: Some(content_type.into()),
            data: Some(BASE64_STANDARD.encode(bytes)),
            url: None,
            ignore_if_error: false,
        }
    }

    /// Let the notification go out even if this attachment cannot be delivered.
    pub fn ignore_if_error(mut self, ignore: bool) -> Self {
        self.ignore_if_error = ignore;
        self
    }
}

/// Push an attachment into `parent[field].$attachments`, creating the containers on demand.
///
/// Returns `false` without touching anything when `parent[field]` exists but is not an
/// object.
pub(crate) fn push_attachment(parent: &mut Value, field: &str, attachment: &Attachment) -> bool {
    let Some(root) = parent.as_object_mut() else {
        return false;
    };
    let slot = root.entry(field).or_insert_with(|| Value::Object(Default::default()));
    if slot.is_null() {
        *slot = Value::Object(Default::default());
    }
    let Some(container) = slot.as_object_mut() else {
        return false;
    };
    let list = container
        .entry(ATTACHMENTS_KEY)
        .or_insert_with(|| Value::Array(Vec::new()));
    if !list.is_array() {
        *list = Value::Array(Vec::new());
    }
    match (list.as_array_mut(), serde_json::to_value(attachment)) {
        (Some(items), Ok(value)) => {
            items.push(value);
            true
        }
        _ => false,
    }
}
