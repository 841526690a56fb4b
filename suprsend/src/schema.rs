//! JSON schema validation of outgoing records.
//!
//! Schemas ship inside the binary (`schemas/*.json`) and are compiled lazily into a
//! [`SchemaCache`]. One cache is normally shared by a client and every collection it
//! hands out.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use parking_lot::RwLock;
use rust_embed::RustEmbed;
use serde_json::{Map, Value};

use crate::errors::{Error, Result};

#[derive(RustEmbed)]
#[folder = "schemas/"]
#[include = "*.json"]
struct SchemaAssets;

/// Schemas known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaName {
    WorkflowTrigger,
    Event,
    ListBroadcast,
}

impl SchemaName {
    pub const ALL: [SchemaName; 3] = [SchemaName::WorkflowTrigger, SchemaName::Event, SchemaName::ListBroadcast];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaName::WorkflowTrigger => "workflow_trigger",
            SchemaName::Event => "event",
            SchemaName::ListBroadcast => "list_broadcast",
        }
    }

    /// Nested object every record of this kind must carry.
    pub fn payload_field(&self) -> &'static str {
        match self {
            SchemaName::WorkflowTrigger | SchemaName::ListBroadcast => "data",
            SchemaName::Event => "properties",
        }
    }
}

impl fmt::Display for SchemaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiled validators keyed by schema name.
#[derive(Default)]
pub struct SchemaCache {
    validators: RwLock<HashMap<String, Arc<Validator>>>,
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.validators.read().keys().cloned().collect();
        f.debug_struct("SchemaCache").field("compiled", &names).finish()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every known schema now instead of on first use.
    pub fn preload(&self) -> Result<()> {
        for name in SchemaName::ALL {
            self.validator(name.as_str())?;
        }
        Ok(())
    }

    pub fn clear(&self) {
        self.validators.write().clear();
    }

    /// Number of compiled validators held.
    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }

    /// Compiled validator for a schema asset, compiling and caching it on first use.
    pub fn validator(&self, name: &str) -> Result<Arc<Validator>> {
        if let Some(validator) = self.validators.read().get(name) {
            return Ok(Arc::clone(validator));
        }

        let validator = Arc::new(compile(name)?);
        let mut validators = self.validators.write();
        let entry = validators.entry(name.to_string()).or_insert(validator);
        Ok(Arc::clone(entry))
    }

    /// Normalize and validate a record.
    ///
    /// A missing or null payload field (`data` or `properties`) is set to `{}` first.
    pub fn validate(&self, mut record: Value, name: SchemaName) -> Result<Value> {
        let field = name.payload_field();
        let obj = record
            .as_object_mut()
            .ok_or_else(|| Error::input(format!("{name} record must be a JSON object")))?;

        match obj.get(field) {
            None | Some(Value::Null) => {
                obj.insert(field.to_string(), Value::Object(Map::new()));
            }
            Some(Value::Object(_)) => {}
            Some(_) => return Err(Error::input(format!("{field} must be a JSON object"))),
        }

        let validator = self.validator(name.as_str())?;
        if let Some(err) = validator.iter_errors(&record).next() {
            return Err(Error::validation(err.to_string()));
        }
        Ok(record)
    }
}

fn compile(name: &str) -> Result<Validator> {
    let asset = SchemaAssets::get(&format!("{name}.json")).ok_or_else(|| Error::SchemaMissing { name: name.to_string() })?;

    let schema: Value = serde_json::from_slice(&asset.data).map_err(|e| Error::SchemaInvalid {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    jsonschema::draft202012::new(&schema).map_err(|e| Error::SchemaInvalid {
        name: name.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow_body() -> Value {
        json!({
            "workflow": "purchase-made",
            "recipients": [{"distinct_id": "u1", "$email": ["u1@example.com"]}],
        })
    }

    #[test]
    fn test_missing_data_defaults_to_empty_object() {
        let cache = SchemaCache::new();
        let body = cache.validate(workflow_body(), SchemaName::WorkflowTrigger).unwrap();
        assert_eq!(body["data"], json!({}));

        let mut with_null = workflow_body();
        with_null["data"] = Value::Null;
        let body = cache.validate(with_null, SchemaName::WorkflowTrigger).unwrap();
        assert_eq!(body["data"], json!({}));
    }

    #[test]
    fn test_non_object_payload_is_input_error() {
        let cache = SchemaCache::new();
        let mut body = workflow_body();
        body["data"] = json!([1, 2]);
        let err = cache.validate(body, SchemaName::WorkflowTrigger).unwrap_err();
        assert!(matches!(err, Error::Input { .. }));
        assert_eq!(err.to_string(), "data must be a JSON object");

        let err = cache.validate(json!("text"), SchemaName::Event).unwrap_err();
        assert!(matches!(err, Error::Input { .. }));
    }

    #[test]
    fn test_schema_violation() {
        let cache = SchemaCache::new();
        let err = cache
            .validate(json!({"recipients": [{"distinct_id": "u1"}]}), SchemaName::WorkflowTrigger)
            .unwrap_err();
        match err {
            Error::Validation { message } => assert!(message.contains("workflow"), "{message}"),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = cache
            .validate(json!({"workflow": "w", "recipients": []}), SchemaName::WorkflowTrigger)
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn test_event_properties_default() {
        let cache = SchemaCache::new();
        let event = json!({"event": "signup", "env": "ws_key", "distinct_id": "u1"});
        let event = cache.validate(event, SchemaName::Event).unwrap();
        assert_eq!(event["properties"], json!({}));
    }

    #[test]
    fn test_revalidation_is_idempotent() {
        let cache = SchemaCache::new();
        let once = cache.validate(workflow_body(), SchemaName::WorkflowTrigger).unwrap();
        let twice = cache.validate(once.clone(), SchemaName::WorkflowTrigger).unwrap();
        assert_eq!(serde_json::to_vec(&once).unwrap(), serde_json::to_vec(&twice).unwrap());
    }

    #[test]
    fn test_cache_lifecycle() {
        let cache = SchemaCache::new();
        assert!(cache.is_empty());

        cache.validate(workflow_body(), SchemaName::WorkflowTrigger).unwrap();
        assert_eq!(cache.len(), 1);

        cache.preload().unwrap();
        assert_eq!(cache.len(), SchemaName::ALL.len());

        cache.clear();
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_unknown_schema_is_missing() {
        let cache = SchemaCache::new();
        let err = cache.validator("workflow_v0").unwrap_err();
        assert!(matches!(err, Error::SchemaMissing { ref name } if name == "workflow_v0"));
        assert!(!err.is_record_scoped());
    }

    #[test]
    fn test_list_broadcast_schema() {
        let cache = SchemaCache::new();
        let body = json!({"list_id": "l1", "template": "t", "notification_category": "transactional"});
        let body = cache.validate(body, SchemaName::ListBroadcast).unwrap();
        assert_eq!(body["data"], json!({}));
    }
}
