//! Authenticated sessions and token caching.
//!
//! This module provides the [`Session`] trait and an on-disk [`SessionCache`]
//! so repeated sdb calls can reuse an identity token instead of
//! authenticating on every lookup.

use crate::{Result, SdbError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Session represents an authenticated session with a backend.
///
/// All session implementations must be `Send + Sync` to support concurrent
/// access across async tasks.
#[async_trait]
pub trait Session: Send + Sync {
    /// Returns the session token.
    ///
    /// For Barbican this is the Keystone token sent as `X-Auth-Token`.
    /// Backends without authentication return a placeholder.
    fn token(&self) -> &str;

    /// Checks if the session is still valid.
    async fn is_valid(&self) -> bool;

    /// Attempts to refresh an expired session.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::SessionExpired`] if refresh is impossible and
    /// the backend must authenticate again.
    async fn refresh(&mut self) -> Result<()>;

    /// Returns when the session expires, if applicable.
    fn expires_at(&self) -> Option<DateTime<Utc>>;
}

/// Cached session data stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSession {
    /// The session token
    pub token: String,
    /// Service endpoint resolved when the token was issued
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// When this session was created
    pub created: DateTime<Utc>,
    /// When this session expires
    pub expires: DateTime<Utc>,
    /// Backend name (for debugging)
    pub backend: String,
    /// Identity the token was issued to; see [`SessionCache::with_scope`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Session cache handles persistence of tokens to disk.
///
/// # Security
///
/// - Cache files are created with mode 0600 (owner read/write only) on Unix
/// - Parent directories are created with mode 0700 (owner access only)
/// - Invalid or expired sessions are automatically deleted
/// - Entries written for another scope are never returned
/// - Tokens are never logged or exposed in errors
///
/// # Example
///
/// ```no_run
/// use barbican_sdb::session::SessionCache;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> barbican_sdb::Result<()> {
///     let cache = SessionCache::new(
///         "/tmp/.barbican-sdb/token.json",
///         Duration::from_secs(1800)
///     ).await?;
///
///     cache.save("gAAAAAB...", Some("https://barbican.example.com/v1"), "barbican", None).await?;
///
///     if let Some(cached) = cache.load().await? {
///         println!("reusing token for {:?}", cached.endpoint);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct SessionCache {
    path: PathBuf,
    ttl: std::time::Duration,
    scope: Option<String>,
}

impl SessionCache {
    /// Creates a new session cache.
    ///
    /// The parent directory is created with restricted permissions (0700 on Unix).
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub async fn new(path: impl AsRef<Path>, ttl: std::time::Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let mut perms = fs::metadata(parent).await?.permissions();
                perms.set_mode(0o700);
                fs::set_permissions(parent, perms).await?;
            }
        }

        Ok(Self {
            path,
            ttl,
            scope: None,
        })
    }

    /// Ties the cache to one identity (endpoint, user and project).
    ///
    /// A file shared between profiles, or left behind after a profile was
    /// edited, then only hands out tokens issued to that identity.
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads a cached session from disk.
    ///
    /// Returns `Ok(None)` if the file does not exist, the session is expired,
    /// the file cannot be parsed, or it was written for another scope.
    /// Unusable files are deleted; foreign-scope entries are left in place.
    ///
    /// # Errors
    ///
    /// Returns an error only for unexpected I/O failures (not missing files).
    pub async fn load(&self) -> Result<Option<CachedSession>> {
        let data = match fs::read(&self.path).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let session: CachedSession = match serde_json::from_slice(&data) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "discarding unreadable session cache");
                let _ = fs::remove_file(&self.path).await;
                return Ok(None);
            }
        };

        if Utc::now() > session.expires {
            let _ = fs::remove_file(&self.path).await;
            return Ok(None);
        }

        if session.scope != self.scope {
            debug!(path = %self.path.display(), "cached session belongs to another identity");
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Saves a session to disk.
    ///
    /// The entry expires after the cache TTL, or earlier when `not_after`
    /// (the token's own expiry) comes first.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails or if the TTL cannot be converted
    /// to a chrono Duration.
    pub async fn save(
        &self,
        token: impl Into<String>,
        endpoint: Option<&str>,
        backend: impl Into<String>,
        not_after: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let now = Utc::now();
        let ttl_duration =
            Duration::from_std(self.ttl).map_err(|e| SdbError::Other(e.into()))?;

        let mut expires = now + ttl_duration;
        if let Some(limit) = not_after {
            expires = expires.min(limit);
        }

        let session = CachedSession {
            token: token.into(),
            endpoint: endpoint.map(str::to_string),
            created: now,
            expires,
            backend: backend.into(),
            scope: self.scope.clone(),
        };

        let json = serde_json::to_vec_pretty(&session)?;

        let mut file = fs::File::create(&self.path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = file.metadata().await?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms).await?;
        }

        file.write_all(&json).await?;
        file.flush().await?;

        Ok(())
    }

    /// Clears the cached session. Missing files are not an error.
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
