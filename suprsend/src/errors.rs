use thiserror::Error as ThisError;

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the client.
///
/// Record-scoped errors (`Input`, `Validation`, `RecordTooLarge`) are caught by bulk
/// collections and turned into failed-record entries. Everything else is systemic and
/// reaches the caller.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing credentials, bad base URL or degenerate limits
    #[error("config error: {message}")]
    Config { message: String },

    /// Malformed record shape
    #[error("{message}")]
    Input { message: String },

    /// Record does not conform to its schema
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A single record can never fit in any chunk
    #[error("record {index} too big - {size} Bytes, must not cross {limit} Bytes")]
    RecordTooLarge { index: usize, size: usize, limit: usize },

    /// Schema asset is not packaged
    #[error("missing JSON schema: {name}")]
    SchemaMissing { name: String },

    /// Schema asset exists but cannot be parsed or compiled
    #[error("invalid JSON schema {name}: {message}")]
    SchemaInvalid { name: String, message: String },

    /// HTTP transport failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Request could not be delivered by a non-reqwest transport
    #[error("transport error: {message}")]
    Transport { message: String },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config { message: message.into() }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Error::Input { message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation { message: message.into() }
    }

    /// Whether the error can be attributed to a single record.
    ///
    /// Bulk collections quarantine these and keep going; anything else aborts the call.
    pub fn is_record_scoped(&self) -> bool {
        matches!(
            self,
            Error::Input { .. } | Error::Validation { .. } | Error::RecordTooLarge { .. } | Error::Json(_)
        )
    }
}
