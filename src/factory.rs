//! Driver registry.
//!
//! Each profile names a `driver`; the registry maps that name to the
//! function that builds the backend from the profile.

use crate::{Backend, Profile, Result, SdbError};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

/// Factory function type for creating backends.
///
/// Factories validate the profile and fail on missing required fields.
pub type BackendFactory = fn(Profile) -> Result<Box<dyn Backend>>;

static BACKEND_REGISTRY: OnceLock<RwLock<HashMap<String, BackendFactory>>> = OnceLock::new();

fn registry() -> &'static RwLock<HashMap<String, BackendFactory>> {
    BACKEND_REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Registers a backend factory function under a driver name.
///
/// # Example
///
/// ```no_run
/// use barbican_sdb::factory::register_backend;
/// use barbican_sdb::{Backend, Profile, Result};
///
/// fn my_backend_factory(profile: Profile) -> Result<Box<dyn Backend>> {
///     # unimplemented!()
/// }
///
/// pub fn register() {
///     register_backend("mybackend", my_backend_factory);
/// }
/// ```
pub fn register_backend(driver: &str, factory: BackendFactory) {
    let mut reg = registry().write().unwrap_or_else(|poisoned| poisoned.into_inner());
    reg.insert(driver.to_string(), factory);
}

/// Creates a backend for a profile.
///
/// # Errors
///
/// Returns an error if:
/// - The profile's driver is not registered (missing feature flag or
///   [`init`](crate::init) call)
/// - The factory rejects the profile, e.g. a required field is missing
pub fn new_backend(profile: Profile) -> Result<Box<dyn Backend>> {
    let driver = profile.driver.to_string();

    let factory = {
        let reg = registry().read().unwrap_or_else(|poisoned| poisoned.into_inner());
        *reg
            .get(&driver)
            .ok_or_else(|| SdbError::UnknownDriver(driver.clone()))?
    };

    factory(profile)
}
