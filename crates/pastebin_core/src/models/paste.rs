//! Paste record stored in the KV store and the shapes returned by the API.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Paste record, stored as a single JSON value under `paste:{id}`.
///
/// Field names and timestamp formats match records written by earlier
/// deployments, so existing data stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paste {
    pub id: String,
    pub content: String,
    /// Creation instant in milliseconds since the epoch.
    pub created_at: i64,
    pub ttl_seconds: Option<u64>,
    pub max_views: Option<u64>,
    pub view_count: u64,
    /// `created_at + ttl_seconds`; present iff `ttl_seconds` is.
    #[serde(default, with = "iso_millis")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Validated create payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePasteRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_views: Option<u64>,
}

/// Response to a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePasteResponse {
    pub id: String,
    pub url: String,
}

/// Response to a successful read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasteView {
    pub content: String,
    pub remaining_views: Option<u64>,
    #[serde(with = "iso_millis")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Format an instant as ISO-8601 with millisecond precision
/// (`2024-01-01T00:00:00.000Z`).
pub fn format_iso_millis(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter for optional ISO-8601 timestamps with millisecond precision.
pub mod iso_millis {
    use super::format_iso_millis;
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(instant) => serializer.serialize_some(&format_iso_millis(instant)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|text| {
            DateTime::parse_from_rfc3339(&text)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(D::Error::custom)
        })
        .transpose()
    }
}
