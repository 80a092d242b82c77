//! barbican-sdb - sdb-style secret lookups backed by OpenStack Barbican.
//!
//! Configuration-management runtimes reference secrets with URIs such as
//! `sdb://pwd/user1`: `pwd` names a connection profile and `user1` is the
//! secret key. This crate resolves those URIs and exposes the three sdb
//! operations against a Barbican key manager authenticated through
//! Keystone v3.
//!
//! | Operation | Key present | Key absent |
//! |-----------|-------------|------------|
//! | `get` | latest value | `None` |
//! | `set` | `None`, nothing written | value stored, returned |
//! | `delete` | latest version removed, `true` | `false` |
//!
//! # Quick Start
//!
//! ```no_run
//! use barbican_sdb::{Profiles, Sdb};
//!
//! #[tokio::main]
//! async fn main() -> barbican_sdb::Result<()> {
//!     let profiles = Profiles::from_path("/etc/salt/master.d/passwords.conf").await?;
//!     let sdb = Sdb::new(profiles);
//!
//!     sdb.set("sdb://pwd/user1", "$5$0DZt7BTf$gjNPsFCJ").await?;
//!
//!     if let Some(hash) = sdb.get("sdb://pwd/user1").await? {
//!         println!("{}", hash);
//!     }
//!
//!     sdb.delete("sdb://pwd/user1").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! | Feature | Default | Driver |
//! |---------|---------|--------|
//! | `barbican` | yes | OpenStack Barbican over HTTPS |
//! | `mock` | yes | In-memory testing backend |

pub mod backend;
pub mod backends;
pub mod config;
pub mod error;
pub mod factory;
pub mod sdb;
pub mod secret;
pub mod session;
pub mod uri;
pub mod validation;

pub use backend::Backend;
pub use config::{BackendType, Profile, Profiles};
pub use error::{Result, SdbError};
pub use sdb::Sdb;
pub use secret::Secret;
pub use session::Session;
pub use uri::SdbUri;

use std::sync::Once;

static INIT: Once = Once::new();

/// Registers all compiled drivers with the factory.
///
/// [`Sdb::new`] calls this for you; call it explicitly only when using
/// [`factory::new_backend`] directly. It is idempotent.
pub fn init() {
    INIT.call_once(backends::register_all);
}
