//! Backend trait definition.
//!
//! A backend implements four storage primitives over a remote secret store.
//! The sdb contract operations, [`Backend::get`], [`Backend::set`] and
//! [`Backend::delete`], are provided on top of them so every driver answers
//! them identically.

use crate::secret::latest;
use crate::validation::validate_secret_name;
use crate::{Result, Secret, Session};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Backend represents a secret storage backend.
///
/// All implementations must be `Send + Sync` to support concurrent access
/// across async tasks.
///
/// # Example
///
/// ```no_run
/// use barbican_sdb::{factory, Backend, BackendType, Profile};
///
/// #[tokio::main]
/// async fn main() -> barbican_sdb::Result<()> {
///     barbican_sdb::init();
///
///     let profile = Profile::new(BackendType::Barbican)
///         .with_option("auth_url", "https://auth.cloud.ovh.net/v3")
///         .with_option("username", "user-xxxxxxxxxxxx")
///         .with_option("user_domain_name", "Default")
///         .with_option("password", "xxxxxxxx")
///         .with_option("project_name", "xxxxxxxxxxxxxxxxx")
///         .with_option("project_domain_name", "Default");
///
///     let mut backend = factory::new_backend(profile)?;
///     backend.init().await?;
///     let session = backend.authenticate().await?;
///
///     backend.set("user1", "s3cret", &*session).await?;
///     let value = backend.get("user1", &*session).await?;
///     println!("Retrieved: {:?}", value);
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait Backend: Send + Sync {
    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns the driver name (e.g., "barbican", "mock").
    fn name(&self) -> &str;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Prepares clients and caches. Profile validation happens earlier, when
    /// the backend is constructed.
    async fn init(&mut self) -> Result<()>;

    /// Releases clients and forgets the current token.
    async fn close(&mut self) -> Result<()>;

    /// Checks if the backend currently holds credentials it can use.
    async fn is_authenticated(&self) -> bool;

    /// Authenticates with the backend and returns a session.
    ///
    /// # Errors
    ///
    /// - [`SdbError::NotAuthenticated`](crate::SdbError::NotAuthenticated):
    ///   credentials were rejected
    /// - [`SdbError::NotFound`](crate::SdbError::NotFound):
    ///   the service catalog has no usable endpoint
    async fn authenticate(&mut self) -> Result<Arc<dyn Session>>;

    // ========================================================================
    // Storage primitives
    // ========================================================================

    /// Lists every secret named exactly `name`, in backend order.
    async fn list_secrets(&self, name: &str, session: &dyn Session) -> Result<Vec<Secret>>;

    /// Retrieves the payload of a listed secret.
    async fn fetch_payload(&self, secret: &Secret, session: &dyn Session) -> Result<String>;

    /// Stores a new text secret and returns it.
    async fn store_secret(
        &mut self,
        name: &str,
        payload: &str,
        session: &dyn Session,
    ) -> Result<Secret>;

    /// Removes one secret.
    async fn remove_secret(&mut self, secret: &Secret, session: &dyn Session) -> Result<()>;

    // ========================================================================
    // sdb contract
    // ========================================================================

    /// Returns the payload of the latest secret named `key`, or `None` when
    /// no secret has that name.
    async fn get(&self, key: &str, session: &dyn Session) -> Result<Option<String>> {
        validate_secret_name(key)?;

        let secrets = self.list_secrets(key, session).await?;
        let Some(secret) = latest(&secrets) else {
            debug!(backend = self.name(), key, "no secret with this name");
            return Ok(None);
        };

        self.fetch_payload(secret, session).await.map(Some)
    }

    /// Stores `value` under `key` if the key is free.
    ///
    /// Returns the stored payload, or `None` when a secret with that name
    /// already exists. Existing secrets are never overwritten.
    async fn set(&mut self, key: &str, value: &str, session: &dyn Session) -> Result<Option<String>> {
        validate_secret_name(key)?;

        if !self.list_secrets(key, session).await?.is_empty() {
            warn!(backend = self.name(), "the key {} is already taken.", key);
            return Ok(None);
        }

        let stored = self.store_secret(key, value, session).await?;
        debug!(backend = self.name(), key, id = %stored.id, "stored secret");
        Ok(Some(stored.payload.unwrap_or_else(|| value.to_string())))
    }

    /// Removes the latest secret named `key`.
    ///
    /// Returns `false` when no secret has that name.
    async fn delete(&mut self, key: &str, session: &dyn Session) -> Result<bool> {
        validate_secret_name(key)?;

        let secrets = self.list_secrets(key, session).await?;
        let Some(secret) = latest(&secrets) else {
            return Ok(false);
        };

        self.remove_secret(secret, session).await?;
        debug!(backend = self.name(), key, id = %secret.id, "removed secret");
        Ok(true)
    }
}
