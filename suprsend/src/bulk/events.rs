//! Tracked events and their bulk collection.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{BulkCollection, BulkRecord, RecordContext};
use crate::attachment::{self, Attachment};
use crate::chunker::ChunkLimits;
use crate::config::BulkLimits;
use crate::errors::{Error, Result};
use crate::http::ReqwestHttpClient;
use crate::schema::SchemaName;
use crate::size::RecordKind;

/// Event names that may start with `$`.
pub const RESERVED_EVENT_NAMES: [&str; 7] = [
    "$identify",
    "$notification_delivered",
    "$notification_dismiss",
    "$notification_clicked",
    "$app_launched",
    "$user_login",
    "$user_logout",
];

/// Bulk collection of events, sent to `{base_url}event/`.
pub type BulkEvents<C = ReqwestHttpClient> = BulkCollection<Event, C>;

/// An event performed by a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub distinct_id: String,
    #[serde(rename = "event")]
    pub event_name: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(rename = "$idempotency_key", default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_id: Option<String>,
}

impl Event {
    pub fn new(distinct_id: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            event_name: event_name.into(),
            ..Default::default()
        }
    }

    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_brand_id(mut self, brand_id: impl Into<String>) -> Self {
        self.brand_id = Some(brand_id.into());
        self
    }

    /// Attach a file under `properties.$attachments`.
    ///
    /// Ignored with a warning when `properties` is not an object.
    pub fn add_attachment(&mut self, attachment: Attachment) {
        let mut holder = json!({ "properties": std::mem::take(&mut self.properties) });
        if !attachment::push_attachment(&mut holder, "properties", &attachment) {
            tracing::warn!(distinct_id = %self.distinct_id, "Attachment not added: properties must be a JSON object");
        }
        self.properties = holder["properties"].take();
    }
}

/// Rejects `$`- and `ss_`-prefixed names unless they are reserved system events.
fn check_event_prefix(event_name: &str) -> Result<()> {
    if RESERVED_EVENT_NAMES.contains(&event_name) {
        return Ok(());
    }
    let prefix: String = event_name.chars().take(3).collect::<String>().to_lowercase();
    if prefix.starts_with('$') || prefix == "ss_" {
        return Err(Error::input("event_names starting with [$,ss_] are reserved by SuprSend"));
    }
    Ok(())
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl BulkRecord for Event {
    const KIND: RecordKind = RecordKind::Event;

    fn endpoint(base_url: &str) -> String {
        format!("{base_url}event/")
    }

    fn limits(limits: &BulkLimits) -> ChunkLimits {
        limits.events
    }

    fn is_empty(&self) -> bool {
        let no_properties = match &self.properties {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        self.distinct_id.trim().is_empty() && self.event_name.trim().is_empty() && no_properties
    }

    fn prepare(&self, ctx: &RecordContext<'_>) -> Result<Value> {
        let distinct_id = self.distinct_id.trim();
        if distinct_id.is_empty() {
            return Err(Error::input("distinct_id missing"));
        }
        let event_name = self.event_name.trim();
        if event_name.is_empty() {
            return Err(Error::input("event_name missing"));
        }
        check_event_prefix(event_name)?;

        let mut properties = match &self.properties {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => return Err(Error::input("properties must be a JSON object")),
        };
        properties.insert("$ss_sdk_version".to_string(), Value::String(ctx.config.user_agent()));

        let mut event = json!({
            "$insert_id": Uuid::new_v4().to_string(),
            "$time": Utc::now().timestamp_millis(),
            "event": event_name,
            "env": ctx.config.workspace_key,
            "distinct_id": distinct_id,
            "properties": properties,
        });
        if let Some(obj) = event.as_object_mut() {
            if let Some(key) = non_empty(&self.idempotency_key) {
                obj.insert("$idempotency_key".to_string(), Value::from(key));
            }
            if let Some(tenant_id) = non_empty(&self.tenant_id) {
                obj.insert("tenant_id".to_string(), Value::from(tenant_id));
            }
            if let Some(brand_id) = non_empty(&self.brand_id) {
                obj.insert("brand_id".to_string(), Value::from(brand_id));
            }
        }

        ctx.schemas.validate(event, SchemaName::Event)
    }

    fn as_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
