//! HMAC-SHA256 request signing.
//!
//! The signature is computed over a newline-joined string-to-sign:
//!
//! ```text
//! {verb}\n{content-md5-hex}\n{content-type}\n{date}\n{request-uri}
//! ```
//!
//! - `content-md5-hex` is empty for `GET` and for requests without a body
//! - `request-uri` is the URL path plus `?query` when a query string is present
//! - The signature is the base64 encoding of the raw HMAC digest (not its hex form)
//!
//! The `Authorization` header value is `{workspace_key}:{signature}`.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use serde_json::Value;
use sha2::Sha256;
use url::Url;

use crate::errors::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Format of the `Date` header taking part in the signature.
pub const HEADER_DATE_FMT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Headers that take part in the string-to-sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningHeaders {
    pub content_type: String,
    pub date: String,
}

/// Output of [`sign`]: the exact body text to send and its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Serialized body. Empty when the request carries no content.
    pub content_txt: String,
    /// base64-encoded HMAC-SHA256 digest
    pub signature: String,
}

/// Sign a request.
///
/// # Arguments
///
/// * `url` - Full request URL; only its path and query are signed
/// * `http_verb` - Upper-case HTTP method
/// * `content` - JSON body, `None` for body-less requests
/// * `headers` - Content-Type and Date exactly as they will be sent
/// * `secret` - Workspace secret used as HMAC key
pub fn sign(url: &str, http_verb: &str, content: Option<&Value>, headers: &SigningHeaders, secret: &str) -> Result<Signature> {
    let (content_txt, content_md5) = match content {
        Some(body) if http_verb != "GET" => {
            let txt = serde_json::to_string(body)?;
            let md5 = format!("{:x}", Md5::digest(txt.as_bytes()));
            (txt, md5)
        }
        _ => (String::new(), String::new()),
    };

    let request_uri = request_uri(url)?;
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}\n{}",
        http_verb, content_md5, headers.content_type, headers.date, request_uri
    );

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| Error::config(format!("invalid signing secret: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(Signature {
        content_txt,
        signature: BASE64_STANDARD.encode(digest),
    })
}

/// Path plus `?query` of a URL; scheme and host are excluded.
pub fn request_uri(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| Error::config(format!("invalid url '{url}': {e}")))?;
    Ok(match parsed.query() {
        Some(query) if !query.is_empty() => format!("{}?{}", parsed.path(), query),
        _ => parsed.path().to_string(),
    })
}

/// `Authorization` header value.
pub fn authorization_header(workspace_key: &str, signature: &Signature) -> String {
    format!("{}:{}", workspace_key, signature.signature)
}
