//! Artifact paths and data URIs.
//!
//! Path shape: `<namespace>/<YYYY>-<MM>/<prefix>_<name>_<timestamp>.<ext>`.
//! The timestamp is UTC ISO-8601 with milliseconds where `:` and `.` become
//! `-`, so names sort chronologically and stay portable.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::config::PersistenceConfig;
use crate::error::DownloadError;
use crate::naming::DerivedName;

/// Characters a URI component leaves unescaped besides alphanumerics.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// `2025-05-14T10:22:33.123Z` → `2025-05-14T10-22-33-123Z`.
#[must_use]
pub fn timestamp_token(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
        .replace([':', '.'], "-")
}

/// Year-month partition (`2025-05`).
#[must_use]
pub fn partition(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Relative artifact path for one capture, with `/` separators.
///
/// Partition and timestamp come from the same instant.
#[must_use]
pub fn artifact_path(config: &PersistenceConfig, name: &DerivedName, now: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}_{}_{}.{}",
        config.namespace.trim_matches('/'),
        partition(now),
        config.prefix,
        name,
        timestamp_token(now),
        config.extension
    )
}

/// Encode `content` as `data:<mime>;charset=utf-8,<escaped>`.
#[must_use]
pub fn to_data_uri(mime: &str, content: &str) -> String {
    format!(
        "data:{mime};charset=utf-8,{}",
        utf8_percent_encode(content, URI_COMPONENT)
    )
}

/// Decoded data URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// Media type and parameters, without `;base64`.
    pub media_type: String,
    pub body: Vec<u8>,
}

/// Decode a `data:` URI, percent-escaped or `;base64`.
pub fn decode_data_uri(uri: &str) -> Result<DataUri, DownloadError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| DownloadError::InvalidUrl(truncate(uri)))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| DownloadError::InvalidUrl(truncate(uri)))?;

    if let Some(media_type) = meta.strip_suffix(";base64") {
        let body = STANDARD
            .decode(percent_decode_str(payload).collect::<Vec<u8>>())
            .map_err(|err| DownloadError::InvalidUrl(format!("bad base64 payload: {err}")))?;
        return Ok(DataUri {
            media_type: media_type.to_string(),
            body,
        });
    }

    Ok(DataUri {
        media_type: meta.to_string(),
        body: percent_decode_str(payload).collect(),
    })
}

fn truncate(uri: &str) -> String {
    uri.chars().take(48).collect()
}
