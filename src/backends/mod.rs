//! Backend implementations.

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "barbican")]
pub mod barbican;

/// Registers all compiled drivers with the factory.
pub fn register_all() {
    #[cfg(feature = "mock")]
    mock::register();

    #[cfg(feature = "barbican")]
    barbican::register();
}
