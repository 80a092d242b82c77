//! Keystone token session.

use crate::{Result, SdbError, Session};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// Tokens this close to expiry are treated as already expired.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// A project-scoped Keystone token together with the Barbican endpoint it
/// was issued for.
#[derive(Debug, Clone)]
pub struct KeystoneSession {
    token: String,
    endpoint: String,
    expires_at: Option<DateTime<Utc>>,
}

impl KeystoneSession {
    pub fn new(token: String, endpoint: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token,
            endpoint,
            expires_at,
        }
    }

    /// Barbican API root, ending in `/v1`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map_or(false, |at| Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= at)
    }
}

#[async_trait]
impl Session for KeystoneSession {
    fn token(&self) -> &str {
        &self.token
    }

    async fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    async fn refresh(&mut self) -> Result<()> {
        // Password credentials live in the backend; it must re-authenticate.
        if self.is_expired() {
            return Err(SdbError::SessionExpired);
        }
        Ok(())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}
