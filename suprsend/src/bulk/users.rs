//! User profile edits and their bulk collection.
//!
//! Every builder call on [`UserEdit`] produces at most one operation object in
//! `$user_operations`:
//!
//! | call | operation key |
//! |---|---|
//! | `set` / `set_preferred_language` / `set_timezone` | `$set` |
//! | `set_once` | `$set_once` |
//! | `increment` | `$add` |
//! | `append` / `add_<channel>` | `$append` |
//! | `remove` / `remove_<channel>` | `$remove` |
//! | `unset` | `$unset` |
//!
//! Bad keys or channel values never fail the edit: they are skipped and reported through
//! [`UserEdit::warnings`].

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::{BulkCollection, BulkRecord, RecordContext};
use crate::chunker::ChunkLimits;
use crate::config::BulkLimits;
use crate::errors::{Error, Result};
use crate::http::ReqwestHttpClient;
use crate::size::RecordKind;

pub const KEY_ID_PROVIDER: &str = "$id_provider";
pub const KEY_PREFERRED_LANGUAGE: &str = "$preferred_language";
pub const KEY_TIMEZONE: &str = "$timezone";

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S+@\S+\.\S+$").expect("Invalid email regex"));
static MOBILE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+[0-9\s]+").expect("Invalid mobile regex"));

/// Bulk collection of user edits, sent to `{base_url}event/`.
pub type BulkUsersEdit<C = ReqwestHttpClient> = BulkCollection<UserEdit, C>;

impl<C: crate::http::HttpClient> BulkCollection<UserEdit, C> {
    /// Alias of [`BulkCollection::trigger`].
    pub async fn save(&mut self) -> Result<crate::bulk_response::BulkResponse> {
        self.trigger().await
    }
}

/// Communication channels that live as identities on a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
    AndroidPush,
    IosPush,
    WebPush,
    Slack,
    MsTeams,
}

impl Channel {
    pub const ALL: [Channel; 8] = [
        Channel::Email,
        Channel::Sms,
        Channel::Whatsapp,
        Channel::AndroidPush,
        Channel::IosPush,
        Channel::WebPush,
        Channel::Slack,
        Channel::MsTeams,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Channel::Email => "$email",
            Channel::Sms => "$sms",
            Channel::Whatsapp => "$whatsapp",
            Channel::AndroidPush => "$androidpush",
            Channel::IosPush => "$iospush",
            Channel::WebPush => "$webpush",
            Channel::Slack => "$slack",
            Channel::MsTeams => "$ms_teams",
        }
    }

    pub fn from_key(key: &str) -> Option<Channel> {
        Channel::ALL.into_iter().find(|c| c.key() == key)
    }

    /// Supported push providers, default first.
    fn providers(&self) -> Option<&'static [&'static str]> {
        match self {
            Channel::AndroidPush => Some(&["fcm", "xiaomi", "oppo"]),
            Channel::IosPush => Some(&["apns"]),
            Channel::WebPush => Some(&["vapid"]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Set,
    SetOnce,
    Increment,
    Append,
    Remove,
}

impl OpKind {
    fn caller(&self) -> &'static str {
        match self {
            OpKind::Set => "set",
            OpKind::SetOnce => "set_once",
            OpKind::Increment => "increment",
            OpKind::Append => "append",
            OpKind::Remove => "remove",
        }
    }
}

/// Pending maps of one builder call.
#[derive(Debug, Default)]
struct Operation {
    set: Map<String, Value>,
    set_once: Map<String, Value>,
    add: Map<String, Value>,
    append: Map<String, Value>,
    remove: Map<String, Value>,
    unset: Vec<String>,
    info: Vec<String>,
    errors: Vec<String>,
}

impl Operation {
    fn map_for(&mut self, kind: OpKind) -> &mut Map<String, Value> {
        match kind {
            OpKind::Set => &mut self.set,
            OpKind::SetOnce => &mut self.set_once,
            OpKind::Increment => &mut self.add,
            OpKind::Append => &mut self.append,
            OpKind::Remove => &mut self.remove,
        }
    }

    /// Trimmed key, or `None` with a note when it is empty.
    fn valid_key(&mut self, key: &str, caller: &str) -> Option<String> {
        let key = key.trim();
        if key.is_empty() {
            self.info.push(format!("[{caller}] skipping key: empty string"));
            return None;
        }
        Some(key.to_string())
    }

    fn put(&mut self, kind: OpKind, key: &str, value: Value, provider: Option<&str>) {
        let caller = kind.caller();
        let Some(key) = self.valid_key(key, caller) else {
            return;
        };
        match Channel::from_key(&key) {
            Some(channel) if matches!(kind, OpKind::Append | OpKind::Remove) => {
                self.identity(kind, channel, value, provider, &format!("{caller}:{key}"));
            }
            _ => {
                self.map_for(kind).insert(key, value);
            }
        }
    }

    fn identity(&mut self, kind: OpKind, channel: Channel, value: Value, provider: Option<&str>, caller: &str) {
        let Some(value) = self.check_identity_value(channel, value, caller) else {
            return;
        };

        let provider = match channel.providers() {
            Some(supported) => {
                let provider = provider.map(str::trim).filter(|p| !p.is_empty()).unwrap_or(supported[0]);
                if !supported.contains(&provider) {
                    let name = &channel.key()[1..];
                    self.errors.push(format!("[{caller}] unsupported {name} provider {provider}"));
                    return;
                }
                Some(provider.to_string())
            }
            None => None,
        };

        let map = self.map_for(kind);
        map.insert(channel.key().to_string(), value);
        if let Some(provider) = provider {
            map.insert(KEY_ID_PROVIDER.to_string(), Value::String(provider));
        }
    }

    fn check_identity_value(&mut self, channel: Channel, value: Value, caller: &str) -> Option<Value> {
        match channel {
            Channel::Email | Channel::Sms | Channel::Whatsapp | Channel::AndroidPush | Channel::IosPush => {
                let Some(text) = value.as_str().map(str::trim).filter(|v| !v.is_empty()) else {
                    self.errors.push(format!("[{caller}] value must be a string with proper value"));
                    return None;
                };
                match channel {
                    Channel::Email => {
                        if !EMAIL_REGEX.is_match(text) {
                            self.errors.push(format!(
                                "[{caller}] invalid value {text}. value in email format required. e.g. user@example.com"
                            ));
                            return None;
                        }
                        if !(6..=127).contains(&text.len()) {
                            self.errors
                                .push(format!("[{caller}] invalid value {text}. must be 6 <= len(email) <= 127"));
                            return None;
                        }
                    }
                    Channel::Sms | Channel::Whatsapp => {
                        if !MOBILE_REGEX.is_match(text) {
                            self.errors.push(format!(
                                "[{caller}] invalid value {text}. number must start with + and must contain country code. e.g. +41446681800"
                            ));
                            return None;
                        }
                        if text.len() < 8 {
                            self.errors
                                .push(format!("[{caller}] invalid value {text}. len(mobile_no) must be >= 8"));
                            return None;
                        }
                    }
                    _ => {}
                }
                Some(Value::String(text.to_string()))
            }
            Channel::WebPush | Channel::Slack | Channel::MsTeams => {
                if value.as_object().is_some_and(|map| !map.is_empty()) {
                    return Some(value);
                }
                let name = &channel.key()[1..];
                self.errors
                    .push(format!("[{caller}] value must be a valid JSON object representing {name} identity"));
                None
            }
        }
    }

    fn into_parts(self) -> (Option<Value>, Vec<String>, Vec<String>) {
        let mut op = Map::new();
        let maps = [
            ("$set", self.set),
            ("$set_once", self.set_once),
            ("$add", self.add),
            ("$append", self.append),
            ("$remove", self.remove),
        ];
        for (name, map) in maps {
            if !map.is_empty() {
                op.insert(name.to_string(), Value::Object(map));
            }
        }
        if !self.unset.is_empty() {
            op.insert("$unset".to_string(), json!(self.unset));
        }
        let op = (!op.is_empty()).then_some(Value::Object(op));
        (op, self.info, self.errors)
    }
}

/// Edits to one user profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserEdit {
    distinct_id: String,
    operations: Vec<Value>,
    info: Vec<String>,
    errors: Vec<String>,
}

impl UserEdit {
    pub fn new(distinct_id: impl Into<String>) -> Self {
        Self {
            distinct_id: distinct_id.into(),
            ..Default::default()
        }
    }

    pub fn distinct_id(&self) -> &str {
        &self.distinct_id
    }

    pub fn operations(&self) -> &[Value] {
        &self.operations
    }

    /// Skipped keys.
    pub fn info(&self) -> &[String] {
        &self.info
    }

    /// Rejected identity values and providers.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn collect(&mut self, op: Operation) -> &mut Self {
        let (operation, info, errors) = op.into_parts();
        self.info.extend(info);
        self.errors.extend(errors);
        if let Some(operation) = operation {
            self.operations.push(operation);
        }
        self
    }

    fn kv(&mut self, kind: OpKind, key: &str, value: Value) -> &mut Self {
        let mut op = Operation::default();
        op.put(kind, key, value, None);
        self.collect(op)
    }

    fn kv_all(&mut self, kind: OpKind, entries: Map<String, Value>) -> &mut Self {
        let provider = entries.get(KEY_ID_PROVIDER).and_then(Value::as_str).map(str::to_string);
        let mut op = Operation::default();
        for (key, value) in entries {
            if key == KEY_ID_PROVIDER && matches!(kind, OpKind::Append | OpKind::Remove) {
                continue;
            }
            op.put(kind, &key, value, provider.as_deref());
        }
        self.collect(op)
    }

    fn channel(&mut self, kind: OpKind, channel: Channel, value: Value, provider: Option<&str>) -> &mut Self {
        let caller = format!(
            "{}_{}",
            if kind == OpKind::Append { "add" } else { "remove" },
            &channel.key()[1..]
        );
        let mut op = Operation::default();
        op.identity(kind, channel, value, provider, &caller);
        self.collect(op)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.kv(OpKind::Set, key, value.into())
    }

    pub fn set_all(&mut self, properties: Map<String, Value>) -> &mut Self {
        self.kv_all(OpKind::Set, properties)
    }

    pub fn set_once(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.kv(OpKind::SetOnce, key, value.into())
    }

    pub fn set_once_all(&mut self, properties: Map<String, Value>) -> &mut Self {
        self.kv_all(OpKind::SetOnce, properties)
    }

    pub fn increment(&mut self, key: &str, by: impl Into<Value>) -> &mut Self {
        self.kv(OpKind::Increment, key, by.into())
    }

    pub fn increment_all(&mut self, properties: Map<String, Value>) -> &mut Self {
        self.kv_all(OpKind::Increment, properties)
    }

    /// Append to a list property. Channel keys (`$email`, `$sms`, ...) add an identity.
    pub fn append(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.kv(OpKind::Append, key, value.into())
    }

    /// Like [`append`](Self::append) for many keys; `$id_provider` applies to push channels.
    pub fn append_all(&mut self, properties: Map<String, Value>) -> &mut Self {
        self.kv_all(OpKind::Append, properties)
    }

    pub fn remove(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        self.kv(OpKind::Remove, key, value.into())
    }

    pub fn remove_all(&mut self, properties: Map<String, Value>) -> &mut Self {
        self.kv_all(OpKind::Remove, properties)
    }

    pub fn unset<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut op = Operation::default();
        for key in keys {
            if let Some(key) = op.valid_key(key.as_ref(), "unset") {
                op.unset.push(key);
            }
        }
        self.collect(op)
    }

    pub fn set_preferred_language(&mut self, lang_code: &str) -> &mut Self {
        self.set(KEY_PREFERRED_LANGUAGE, lang_code)
    }

    pub fn set_timezone(&mut self, timezone: &str) -> &mut Self {
        self.set(KEY_TIMEZONE, timezone)
    }

    pub fn add_email(&mut self, value: &str) -> &mut Self {
        self.channel(OpKind::Append, Channel::Email, value.into(), None)
    }

    pub fn remove_email(&mut self, value: &str) -> &mut Self {
        self.channel(OpKind::Remove, Channel::Email, value.into(), None)
    }

    pub fn add_sms(&mut self, value: &str) -> &mut Self {
        self.channel(OpKind::Append, Channel::Sms, value.into(), None)
    }

    pub fn remove_sms(&mut self, value: &str) -> &mut Self {
        self.channel(OpKind::Remove, Channel::Sms, value.into(), None)
    }

    pub fn add_whatsapp(&mut self, value: &str) -> &mut Self {
        self.channel(OpKind::Append, Channel::Whatsapp, value.into(), None)
    }

    pub fn remove_whatsapp(&mut self, value: &str) -> &mut Self {
        self.channel(OpKind::Remove, Channel::Whatsapp, value.into(), None)
    }

    /// Providers: `fcm` (default), `xiaomi`, `oppo`.
    pub fn add_androidpush(&mut self, token: &str, provider: Option<&str>) -> &mut Self {
        self.channel(OpKind::Append, Channel::AndroidPush, token.into(), provider)
    }

    pub fn remove_androidpush(&mut self, token: &str, provider: Option<&str>) -> &mut Self {
        self.channel(OpKind::Remove, Channel::AndroidPush, token.into(), provider)
    }

    /// Providers: `apns` (default).
    pub fn add_iospush(&mut self, token: &str, provider: Option<&str>) -> &mut Self {
        self.channel(OpKind::Append, Channel::IosPush, token.into(), provider)
    }

    pub fn remove_iospush(&mut self, token: &str, provider: Option<&str>) -> &mut Self {
        self.channel(OpKind::Remove, Channel::IosPush, token.into(), provider)
    }

    /// Providers: `vapid` (default).
    pub fn add_webpush(&mut self, subscription: Value, provider: Option<&str>) -> &mut Self {
        self.channel(OpKind::Append, Channel::WebPush, subscription, provider)
    }

    pub fn remove_webpush(&mut self, subscription: Value, provider: Option<&str>) -> &mut Self {
        self.channel(OpKind::Remove, Channel::WebPush, subscription, provider)
    }

    pub fn add_slack(&mut self, value: Value) -> &mut Self {
        self.channel(OpKind::Append, Channel::Slack, value, None)
    }

    pub fn remove_slack(&mut self, value: Value) -> &mut Self {
        self.channel(OpKind::Remove, Channel::Slack, value, None)
    }

    pub fn add_ms_teams(&mut self, value: Value) -> &mut Self {
        self.channel(OpKind::Append, Channel::MsTeams, value, None)
    }

    pub fn remove_ms_teams(&mut self, value: Value) -> &mut Self {
        self.channel(OpKind::Remove, Channel::MsTeams, value, None)
    }
}

impl BulkRecord for UserEdit {
    const KIND: RecordKind = RecordKind::UserEdit;

    fn endpoint(base_url: &str) -> String {
        format!("{base_url}event/")
    }

    fn limits(limits: &BulkLimits) -> ChunkLimits {
        limits.users
    }

    fn is_empty(&self) -> bool {
        self.distinct_id.trim().is_empty() && self.operations.is_empty()
    }

    fn prepare(&self, ctx: &RecordContext<'_>) -> Result<Value> {
        let distinct_id = self.distinct_id.trim();
        if distinct_id.is_empty() {
            return Err(Error::input("distinct_id missing"));
        }
        Ok(json!({
            "$schema": "2",
            "$insert_id": Uuid::new_v4().to_string(),
            "$time": Utc::now().timestamp_millis(),
            "env": ctx.config.workspace_key,
            "distinct_id": distinct_id,
            "$user_operations": self.operations,
            "properties": {"$ss_sdk_version": ctx.config.user_agent()},
        }))
    }

    fn as_json(&self) -> Value {
        json!({
            "distinct_id": self.distinct_id,
            "$user_operations": self.operations,
            "warnings": self.warnings(),
        })
    }

    /// Skipped keys and rejected values, each group prefixed with the distinct id.
    fn warnings(&self) -> Vec<String> {
        [&self.info, &self.errors]
            .into_iter()
            .filter(|messages| !messages.is_empty())
            .map(|messages| format!("[distinct_id: {}]{}", self.distinct_id, messages.join("\n")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::schema::SchemaCache;

    #[test]
    fn test_each_call_is_one_operation() {
        let mut user = UserEdit::new("u1");
        user.set("name", "Ada")
            .set_once("signup", "2026-10-19")
            .increment("logins", 1)
            .append("tags", "beta")
            .remove("tags", "alpha")
            .unset(["legacy", "old"]);

        assert_eq!(
            user.operations(),
            &[
                json!({"$set": {"name": "Ada"}}),
                json!({"$set_once": {"signup": "2026-10-19"}}),
                json!({"$add": {"logins": 1}}),
                json!({"$append": {"tags": "beta"}}),
                json!({"$remove": {"tags": "alpha"}}),
                json!({"$unset": ["legacy", "old"]}),
            ]
        );
        assert!(user.warnings().is_empty());
    }

    #[test]
    fn test_set_all_groups_keys() {
        let mut user = UserEdit::new("u1");
        let mut props = Map::new();
        props.insert("a".into(), json!(1));
        props.insert(" ".into(), json!(2));
        user.set_all(props);

        assert_eq!(user.operations(), &[json!({"$set": {"a": 1}})]);
        assert_eq!(user.info(), &["[set] skipping key: empty string".to_string()]);
    }

    #[test]
    fn test_language_and_timezone() {
        let mut user = UserEdit::new("u1");
        user.set_preferred_language("en").set_timezone("Asia/Kolkata");
        assert_eq!(user.operations()[0], json!({"$set": {"$preferred_language": "en"}}));
        assert_eq!(user.operations()[1], json!({"$set": {"$timezone": "Asia/Kolkata"}}));
    }

    #[test]
    fn test_channels() {
        let mut user = UserEdit::new("u1");
        user.add_email("ada@example.com")
            .add_sms("+41446681800")
            .add_androidpush("token-1", None)
            .add_iospush("token-2", Some("apns"))
            .add_webpush(json!({"endpoint": "https://push.example.com"}), None)
            .add_slack(json!({"email": "ada@example.com", "access_token": "xoxb"}))
            .remove_whatsapp("+41446681800");

        let ops = user.operations();
        assert_eq!(ops[0], json!({"$append": {"$email": "ada@example.com"}}));
        assert_eq!(ops[1], json!({"$append": {"$sms": "+41446681800"}}));
        assert_eq!(ops[2], json!({"$append": {"$androidpush": "token-1", "$id_provider": "fcm"}}));
        assert_eq!(ops[3], json!({"$append": {"$iospush": "token-2", "$id_provider": "apns"}}));
        assert_eq!(ops[4]["$append"]["$id_provider"], "vapid");
        assert_eq!(ops[5]["$append"]["$slack"]["access_token"], "xoxb");
        assert_eq!(ops[6], json!({"$remove": {"$whatsapp": "+41446681800"}}));
        assert!(user.errors().is_empty());
    }

    #[test]
    fn test_append_routes_identity_keys() {
        let mut user = UserEdit::new("u1");
        let mut props = Map::new();
        props.insert("$androidpush".into(), json!("token-1"));
        props.insert("$id_provider".into(), json!("xiaomi"));
        user.append_all(props);
        user.append("$email", "not-an-email");

        assert_eq!(
            user.operations(),
            &[json!({"$append": {"$androidpush": "token-1", "$id_provider": "xiaomi"}})]
        );
        assert_eq!(user.errors().len(), 1);
        assert!(user.errors()[0].starts_with("[append:$email] invalid value not-an-email"));
    }

    #[test]
    fn test_invalid_identities_become_warnings() {
        let mut user = UserEdit::new("u1");
        user.add_email("a@b")
            .add_sms("41446681800")
            .add_sms("+4144")
            .add_androidpush("t", Some("huawei"))
            .add_webpush(json!({}), None)
            .set("", 1);

        assert!(user.operations().is_empty());
        assert_eq!(user.errors().len(), 5);
        assert_eq!(user.errors()[3], "[add_androidpush] unsupported androidpush provider huawei");

        let warnings = user.warnings();
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0], "[distinct_id: u1][set] skipping key: empty string");
        assert!(warnings[1].starts_with("[distinct_id: u1][add_email] invalid value a@b"));
    }

    #[test]
    fn test_async_payload() {
        let config = ClientConfig::new("ws_key", "secret");
        let schemas = SchemaCache::new();
        let ctx = RecordContext {
            config: &config,
            schemas: &schemas,
        };

        let mut user = UserEdit::new("u1");
        user.set("plan", "pro");
        let payload = user.prepare(&ctx).unwrap();

        assert_eq!(payload["$schema"], "2");
        assert_eq!(payload["env"], "ws_key");
        assert_eq!(payload["distinct_id"], "u1");
        assert_eq!(payload["$user_operations"], json!([{"$set": {"plan": "pro"}}]));
        assert!(payload["properties"]["$ss_sdk_version"].is_string());

        let err = UserEdit::new(" ").prepare(&ctx).unwrap_err();
        assert!(matches!(err, Error::Input { .. }));
    }

    #[test]
    fn test_as_json_carries_warnings() {
        let mut user = UserEdit::new("u1");
        user.set(" ", 1);
        let value = user.as_json();
        assert_eq!(value["distinct_id"], "u1");
        assert_eq!(value["warnings"].as_array().unwrap().len(), 1);
        assert!(UserEdit::default().is_empty());
    }
}
