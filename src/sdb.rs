//! URI-level entry point.
//!
//! [`Sdb`] answers `get`, `set` and `delete` for `sdb://profile/key` URIs.
//! It keeps one authenticated backend per profile and re-authenticates
//! when the session stops being valid.

use crate::{factory, Backend, Profiles, Result, SdbError, SdbUri, Session};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct Connection {
    backend: Box<dyn Backend>,
    session: Arc<dyn Session>,
}

impl Connection {
    /// Replaces a session the backend rejected with a fresh one.
    async fn renew(&mut self, profile: &str, cause: &SdbError) -> Result<()> {
        warn!(profile, error = %cause, "session rejected, authenticating again");
        self.session = self.backend.authenticate().await?;
        Ok(())
    }
}

/// Resolves sdb URIs against a set of profiles.
///
/// # Example
///
/// ```
/// use barbican_sdb::{Profiles, Sdb};
///
/// #[tokio::main]
/// async fn main() -> barbican_sdb::Result<()> {
///     let profiles = Profiles::from_yaml_str("local:\n  driver: mock\n")?;
///     let sdb = Sdb::new(profiles);
///
///     assert_eq!(sdb.get("sdb://local/user1").await?, None);
///     assert_eq!(sdb.set("sdb://local/user1", "hash").await?.as_deref(), Some("hash"));
///     assert_eq!(sdb.set("sdb://local/user1", "other").await?, None);
///     assert!(sdb.delete("sdb://local/user1").await?);
///
///     Ok(())
/// }
/// ```
pub struct Sdb {
    profiles: Profiles,
    connections: Mutex<HashMap<String, Connection>>,
}

impl Sdb {
    /// Creates a resolver over `profiles`, registering the compiled drivers.
    pub fn new(profiles: Profiles) -> Self {
        crate::init();
        Self {
            profiles,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Loads profiles from a YAML file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Profiles::from_path(path).await?))
    }

    pub fn profiles(&self) -> &Profiles {
        &self.profiles
    }

    /// Installs an already constructed backend for `profile`, replacing any
    /// existing connection. The backend is initialised and authenticated here.
    pub async fn attach(&self, profile: &str, mut backend: Box<dyn Backend>) -> Result<()> {
        backend.init().await?;
        let session = backend.authenticate().await?;

        let mut connections = self.connections.lock().await;
        if let Some(mut previous) = connections.insert(profile.to_string(), Connection { backend, session }) {
            previous.backend.close().await?;
        }
        Ok(())
    }

    /// Latest value stored under the URI's key, or `None`.
    pub async fn get(&self, uri: &str) -> Result<Option<String>> {
        let uri: SdbUri = uri.parse()?;
        let mut connections = self.connections.lock().await;

        let conn = self.connect(&mut connections, &uri.profile).await?;
        let result = conn.backend.get(&uri.key, &*conn.session).await;
        match result {
            Err(e) if e.is_auth_failure() => {
                conn.renew(&uri.profile, &e).await?;
                conn.backend.get(&uri.key, &*conn.session).await
            }
            other => other,
        }
    }

    /// Stores `value` if the key is free. Returns the stored value, or `None`
    /// when the key is already taken.
    pub async fn set(&self, uri: &str, value: &str) -> Result<Option<String>> {
        let uri: SdbUri = uri.parse()?;
        let mut connections = self.connections.lock().await;

        let conn = self.connect(&mut connections, &uri.profile).await?;
        let result = conn.backend.set(&uri.key, value, &*conn.session).await;
        match result {
            Err(e) if e.is_auth_failure() => {
                conn.renew(&uri.profile, &e).await?;
                conn.backend.set(&uri.key, value, &*conn.session).await
            }
            other => other,
        }
    }

    /// Removes the latest value of the key. Returns whether the key existed.
    pub async fn delete(&self, uri: &str) -> Result<bool> {
        let uri: SdbUri = uri.parse()?;
        let mut connections = self.connections.lock().await;

        let conn = self.connect(&mut connections, &uri.profile).await?;
        let result = conn.backend.delete(&uri.key, &*conn.session).await;
        match result {
            Err(e) if e.is_auth_failure() => {
                conn.renew(&uri.profile, &e).await?;
                conn.backend.delete(&uri.key, &*conn.session).await
            }
            other => other,
        }
    }

    /// Closes every open connection.
    pub async fn close(&self) -> Result<()> {
        let mut connections = self.connections.lock().await;
        for (_, mut conn) in connections.drain() {
            conn.backend.close().await?;
        }
        Ok(())
    }

    async fn connect<'a>(
        &self,
        connections: &'a mut HashMap<String, Connection>,
        profile: &str,
    ) -> Result<&'a mut Connection> {
        let usable = match connections.get_mut(profile) {
            Some(conn) => usable_session(&mut conn.session).await,
            None => false,
        };

        if !usable {
            let config = self
                .profiles
                .get(profile)
                .cloned()
                .ok_or_else(|| SdbError::UnknownProfile(profile.to_string()))?;

            debug!(profile, driver = %config.driver, "opening connection");
            let mut backend = factory::new_backend(config)?;
            backend.init().await?;
            let session = backend.authenticate().await?;
            debug!(profile, expires_at = ?session.expires_at(), "session established");

            if let Some(mut stale) = connections.insert(profile.to_string(), Connection { backend, session }) {
                stale.backend.close().await?;
            }
        }

        connections
            .get_mut(profile)
            .ok_or_else(|| SdbError::UnknownProfile(profile.to_string()))
    }
}

/// Whether a session can serve another request, refreshing it in place
/// when it has gone stale.
async fn usable_session(session: &mut Arc<dyn Session>) -> bool {
    if session.is_valid().await {
        return true;
    }

    let Some(session) = Arc::get_mut(session) else {
        return false;
    };
    match session.refresh().await {
        Ok(()) => session.is_valid().await,
        Err(e) => {
            debug!(error = %e, "session refresh failed");
            false
        }
    }
}
