//! OpenStack Barbican backend.
//!
//! Secrets are read and written through the Barbican v1 REST API. Access is
//! granted by a project-scoped Keystone v3 token obtained with the password
//! method.
//!
//! # Profile
//!
//! | Option | Required | Default |
//! |--------|----------|---------|
//! | `auth_url` | yes | |
//! | `username` | yes | |
//! | `user_domain_name` | yes | |
//! | `password` | yes | |
//! | `project_name` | yes | |
//! | `project_domain_name` | yes | |
//! | `region_name` | no | first matching region |
//! | `interface` | no | `public` |
//! | `endpoint` | no | from the service catalog |
//! | `timeout` | no | 30 seconds |
//! | `session_file` | no | no token cache |
//! | `session_ttl` | no | 1800 seconds |
//!
//! # Example
//!
//! ```no_run
//! use barbican_sdb::{factory, Backend, BackendType, Profile};
//!
//! #[tokio::main]
//! async fn main() -> barbican_sdb::Result<()> {
//!     barbican_sdb::init();
//!
//!     let profile = Profile::new(BackendType::Barbican)
//!         .with_option("auth_url", "https://auth.cloud.ovh.net/v3")
//!         .with_option("username", "user-xxxxxxxxxxxx")
//!         .with_option("user_domain_name", "Default")
//!         .with_option("password", "xxxxxxxx")
//!         .with_option("project_name", "xxxxxxxxxxxxxxxxx")
//!         .with_option("project_domain_name", "Default")
//!         .with_option("region_name", "GRA");
//!
//!     let mut backend = factory::new_backend(profile)?;
//!     backend.init().await?;
//!
//!     let session = backend.authenticate().await?;
//!     let removed = backend.delete("user1", &*session).await?;
//!     println!("removed: {}", removed);
//!
//!     Ok(())
//! }
//! ```

mod backend;
mod keystone;
mod session;

pub use backend::BarbicanBackend;
pub use keystone::{CatalogEndpoint, CatalogEntry, Credentials, Token};
pub use session::KeystoneSession;

/// Registers the Barbican backend with the factory.
pub fn register() {
    crate::factory::register_backend("barbican", |profile| {
        Ok(Box::new(BarbicanBackend::new(profile)?))
    });
}
