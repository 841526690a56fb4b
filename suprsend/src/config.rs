//! Client configuration.
//!
//! Configuration can be built in code with [`ClientConfig::new`] or loaded from an
//! optional YAML file with environment variable overrides.
//!
//! ## Loading Priority
//!
//! 1. **YAML config file** - Base configuration (optional)
//! 2. **Environment variables** - Variables prefixed with `SUPRSEND_` override YAML values
//!
//! For nested values use double underscores, e.g. `SUPRSEND_LIMITS__EVENTS__MAX_RECORDS=50`.
//!
//! ## Environment Variable Examples
//!
//! ```bash
//! SUPRSEND_WORKSPACE_KEY=ws_key
//! SUPRSEND_WORKSPACE_SECRET=ws_secret
//! SUPRSEND_BASE_URL=https://hub.suprsend.com/
//! SUPRSEND_ATTACHMENTS__UPLOAD_ENABLED=true
//! ```

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::chunker::ChunkLimits;
use crate::errors::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://hub.suprsend.com/";

/// 800KB: apparent body size ceiling of one bulk API call
pub const BODY_MAX_APPARENT_SIZE_IN_BYTES: usize = 800 * 1024;
/// 100KB: apparent size ceiling of one workflow body or event
pub const SINGLE_EVENT_MAX_APPARENT_SIZE_IN_BYTES: usize = 100 * 1024;
/// 10KB: apparent size ceiling of one user-edit payload
pub const IDENTITY_SINGLE_EVENT_MAX_APPARENT_SIZE_IN_BYTES: usize = 10 * 1024;

pub const MAX_WORKFLOWS_IN_BULK_API: usize = 100;
pub const MAX_EVENTS_IN_BULK_API: usize = 100;
pub const MAX_IDENTITY_EVENTS_IN_BULK_API: usize = 400;

/// Root client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Public workspace key, sent in the `Authorization` header
    pub workspace_key: String,
    /// Workspace secret used as HMAC key
    pub workspace_secret: String,
    /// API base URL. Normalized to end with `/`.
    pub base_url: String,
    /// Verbose request logging
    pub debug: bool,
    /// Per-request timeout. Unset means the HTTP client default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,
    /// How attachments count towards apparent size
    pub attachments: AttachmentPolicy,
    /// How bulk collections treat empty input on `append`
    pub append_mode: AppendMode,
    /// Chunk limits per endpoint family
    pub limits: BulkLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            workspace_key: String::new(),
            workspace_secret: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            debug: false,
            http_timeout_secs: None,
            attachments: AttachmentPolicy::default(),
            append_mode: AppendMode::default(),
            limits: BulkLimits::default(),
        }
    }
}

/// Attachment handling used by size estimation and bulk requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttachmentPolicy {
    /// Backend replaces inline attachment data with a hosted URL
    pub upload_enabled: bool,
    /// Attachments may travel inside bulk requests
    pub allow_in_bulk: bool,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            upload_enabled: false,
            allow_in_bulk: true,
        }
    }
}

/// Strictness of `append` on bulk collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendMode {
    /// Empty records are skipped silently
    #[default]
    Lenient,
    /// Empty calls and empty records are rejected with an input error
    Strict,
}

/// Chunk limits for every bulk endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BulkLimits {
    pub workflows: ChunkLimits,
    pub events: ChunkLimits,
    pub users: ChunkLimits,
}

impl Default for BulkLimits {
    fn default() -> Self {
        Self {
            workflows: ChunkLimits::new(MAX_WORKFLOWS_IN_BULK_API, BODY_MAX_APPARENT_SIZE_IN_BYTES)
                .with_max_record_bytes(SINGLE_EVENT_MAX_APPARENT_SIZE_IN_BYTES),
            events: ChunkLimits::new(MAX_EVENTS_IN_BULK_API, BODY_MAX_APPARENT_SIZE_IN_BYTES)
                .with_max_record_bytes(SINGLE_EVENT_MAX_APPARENT_SIZE_IN_BYTES),
            users: ChunkLimits::new(MAX_IDENTITY_EVENTS_IN_BULK_API, BODY_MAX_APPARENT_SIZE_IN_BYTES)
                .with_max_record_bytes(IDENTITY_SINGLE_EVENT_MAX_APPARENT_SIZE_IN_BYTES),
        }
    }
}

impl ClientConfig {
    /// Configuration with credentials and defaults for everything else.
    pub fn new(workspace_key: impl Into<String>, workspace_secret: impl Into<String>) -> Self {
        Self {
            workspace_key: workspace_key.into(),
            workspace_secret: workspace_secret.into(),
            ..Default::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_limits(mut self, limits: BulkLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_attachments(mut self, attachments: AttachmentPolicy) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_append_mode(mut self, append_mode: AppendMode) -> Self {
        self.append_mode = append_mode;
        self
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        // SUPRSEND_CONFIG names the file itself
        figment.merge(Env::prefixed("SUPRSEND_").ignore(&["config"]).split("__"))
    }

    /// Load from an optional YAML file plus `SUPRSEND_` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(path).extract().map_err(|e| Error::config(e.to_string()))?;
        config.normalized()
    }

    /// Trim and terminate the base URL with `/`, then validate.
    pub fn normalized(mut self) -> Result<Self> {
        let trimmed = self.base_url.trim();
        self.base_url = if trimmed.is_empty() {
            DEFAULT_BASE_URL.to_string()
        } else if trimmed.ends_with('/') {
            trimmed.to_string()
        } else {
            format!("{trimmed}/")
        };
        self.workspace_key = self.workspace_key.trim().to_string();
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<()> {
        if self.workspace_key.is_empty() {
            return Err(Error::config("Missing workspace_key"));
        }
        if self.workspace_secret.is_empty() {
            return Err(Error::config("Missing workspace_secret"));
        }
        url::Url::parse(&self.base_url).map_err(|e| Error::config(format!("Invalid base_url '{}': {}", self.base_url, e)))?;

        self.limits.workflows.validate("workflows")?;
        self.limits.events.validate("events")?;
        self.limits.users.validate("users")?;
        Ok(())
    }

    /// `User-Agent` header value: `suprsend/<sdk-version>;rust/<rustc-version>`
    pub fn user_agent(&self) -> String {
        format!("suprsend/{};rust/{}", env!("CARGO_PKG_VERSION"), env!("BUILD_RUSTC_VERSION"))
    }
}
