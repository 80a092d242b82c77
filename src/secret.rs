//! Secret records returned by backends.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content type used for secrets stored through the sdb contract.
pub const TEXT_PLAIN: &str = "text/plain";

/// A single version of a named secret.
///
/// Backends may hold several secrets with the same name; the contract
/// operations always act on the most recently created one (see [`latest`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Secret {
    /// Backend identifier (a secret reference URL for Barbican)
    pub id: String,

    /// Secret name, the sdb key
    pub name: String,

    /// Secret value, when already fetched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    /// Payload content type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Backend status (e.g. `ACTIVE`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// When the secret was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl Secret {
    /// Creates a new text secret with a random id, created now.
    ///
    /// ```
    /// use barbican_sdb::Secret;
    ///
    /// let secret = Secret::new_text("user1", "s3cret");
    /// assert_eq!(secret.name, "user1");
    /// assert_eq!(secret.payload.as_deref(), Some("s3cret"));
    /// ```
    pub fn new_text(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            payload: Some(payload.into()),
            content_type: Some(TEXT_PLAIN.to_string()),
            status: Some("ACTIVE".to_string()),
            created: Some(Utc::now()),
        }
    }

    /// Whether the payload can be returned as-is rather than base64 encoded.
    pub fn is_text(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(true, |ct| ct.starts_with("text/"))
    }
}

/// Picks the most recently created secret.
///
/// Secrets without a creation time sort before dated ones. When several
/// share the greatest timestamp, the one listed last wins.
pub fn latest(secrets: &[Secret]) -> Option<&Secret> {
    secrets.iter().max_by_key(|s| s.created)
}

/// Parses a backend timestamp.
///
/// Accepts RFC 3339 as well as the zone-less ISO form Barbican emits
/// (`2015-04-07T03:37:19.805835`), which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
