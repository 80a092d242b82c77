//! Mock backend for testing.
//!
//! This backend provides a complete in-memory implementation with error
//! injection capabilities for testing code that uses the sdb contract.

use crate::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock backend for testing.
///
/// Secrets are kept in insertion order, so several versions of the same
/// name behave as they would in a real store.
///
/// # Example
///
/// ```
/// use barbican_sdb::backends::mock::MockBackend;
/// use barbican_sdb::{Backend, SdbError};
///
/// #[tokio::main]
/// async fn main() -> barbican_sdb::Result<()> {
///     let mut backend = MockBackend::new();
///     backend.init().await?;
///
///     backend.insert_secret("user1", "hash").await;
///
///     let session = backend.authenticate().await?;
///     assert_eq!(backend.get("user1", &*session).await?.as_deref(), Some("hash"));
///
///     backend.list_error = Some(SdbError::PermissionDenied("test".to_string()));
///     assert!(backend.get("user1", &*session).await.is_err());
///
///     Ok(())
/// }
/// ```
pub struct MockBackend {
    secrets: Arc<RwLock<Vec<Secret>>>,

    /// Error to return from `authenticate()`
    pub auth_error: Option<SdbError>,
    /// Error to return from `list_secrets()`
    pub list_error: Option<SdbError>,
    /// Error to return from `fetch_payload()`
    pub fetch_error: Option<SdbError>,
    /// Error to return from `store_secret()`
    pub store_error: Option<SdbError>,
    /// Error to return from `remove_secret()`
    pub remove_error: Option<SdbError>,
}

impl MockBackend {
    /// Creates a new mock backend with empty storage.
    pub fn new() -> Self {
        Self {
            secrets: Arc::new(RwLock::new(Vec::new())),
            auth_error: None,
            list_error: None,
            fetch_error: None,
            store_error: None,
            remove_error: None,
        }
    }

    /// Pre-populates the backend with a secret created now.
    pub async fn insert_secret(&self, name: impl Into<String>, payload: impl Into<String>) {
        let secret = Secret::new_text(name, payload);
        self.secrets.write().await.push(secret);
    }

    /// Pre-populates the backend with a secret created at a given time.
    pub async fn insert_secret_at(
        &self,
        name: impl Into<String>,
        payload: impl Into<String>,
        created: DateTime<Utc>,
    ) {
        let mut secret = Secret::new_text(name, payload);
        secret.created = Some(created);
        self.secrets.write().await.push(secret);
    }

    /// Number of stored secrets, all names and versions included.
    pub async fn len(&self) -> usize {
        self.secrets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.secrets.read().await.is_empty()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn injected(err: &SdbError) -> SdbError {
    SdbError::Other(anyhow::anyhow!("{}", err))
}

/// Mock session that never expires.
pub struct MockSession {
    token: String,
}

impl MockSession {
    fn new() -> Self {
        Self {
            token: "mock-session-token".to_string(),
        }
    }
}

#[async_trait]
impl Session for MockSession {
    fn token(&self) -> &str {
        &self.token
    }

    async fn is_valid(&self) -> bool {
        true
    }

    async fn refresh(&mut self) -> Result<()> {
        Ok(())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    async fn is_authenticated(&self) -> bool {
        self.auth_error.is_none()
    }

    async fn authenticate(&mut self) -> Result<Arc<dyn Session>> {
        if let Some(ref err) = self.auth_error {
            return Err(injected(err));
        }
        Ok(Arc::new(MockSession::new()))
    }

    async fn list_secrets(&self, name: &str, _session: &dyn Session) -> Result<Vec<Secret>> {
        if let Some(ref err) = self.list_error {
            return Err(injected(err));
        }

        let secrets = self.secrets.read().await;
        Ok(secrets
            .iter()
            .filter(|s| s.name == name)
            .map(|s| Secret {
                payload: None,
                ..s.clone()
            })
            .collect())
    }

    async fn fetch_payload(&self, secret: &Secret, _session: &dyn Session) -> Result<String> {
        if let Some(ref err) = self.fetch_error {
            return Err(injected(err));
        }

        let secrets = self.secrets.read().await;
        secrets
            .iter()
            .find(|s| s.id == secret.id)
            .and_then(|s| s.payload.clone())
            .ok_or_else(|| SdbError::NotFound(secret.id.clone()))
    }

    async fn store_secret(
        &mut self,
        name: &str,
        payload: &str,
        _session: &dyn Session,
    ) -> Result<Secret> {
        if let Some(ref err) = self.store_error {
            return Err(injected(err));
        }

        let secret = Secret::new_text(name, payload);
        self.secrets.write().await.push(secret.clone());
        Ok(secret)
    }

    async fn remove_secret(&mut self, secret: &Secret, _session: &dyn Session) -> Result<()> {
        if let Some(ref err) = self.remove_error {
            return Err(injected(err));
        }

        let mut secrets = self.secrets.write().await;
        let position = secrets
            .iter()
            .position(|s| s.id == secret.id)
            .ok_or_else(|| SdbError::NotFound(secret.id.clone()))?;
        secrets.remove(position);
        Ok(())
    }
}

/// Registers the mock backend with the factory.
pub fn register() {
    crate::factory::register_backend("mock", |_profile| Ok(Box::new(MockBackend::new())));
}
