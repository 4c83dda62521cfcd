//! Registry boundary.
//!
//! The engine sees the network server only through [`Registry`]. The HTTP
//! implementation lives in `kl-registry`; an in-memory one lives in
//! `kl-testkit`.

use crate::ReconcileError;

/// Minimal view of a device the registry already knows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryDevice {
    pub dev_eui: String,
    pub name: Option<String>,
    pub application_id: Option<String>,
}

impl RegistryDevice {
    pub fn new(dev_eui: impl Into<String>) -> Self {
        Self {
            dev_eui: dev_eui.into(),
            ..Self::default()
        }
    }
}

/// Network-server device registry contract.
///
/// Fetches return `Ok(None)` for "does not exist" and `Err` for every other
/// failure. Writes propagate all failures. Implementations own their
/// authentication context; callers construct one per run and pass it by
/// reference.
#[async_trait::async_trait]
pub trait Registry: Send + Sync {
    async fn fetch_device(&self, dev_eui: &str) -> Result<Option<RegistryDevice>, ReconcileError>;

    async fn fetch_key(&self, dev_eui: &str) -> Result<Option<String>, ReconcileError>;

    /// Register an absent device using the implementation's device metadata.
    /// Does not provision a key.
    async fn create_device(&self, dev_eui: &str) -> Result<(), ReconcileError>;

    /// First-time key write for a device that has none.
    async fn provision_key(&self, dev_eui: &str, nwk_key: &str) -> Result<(), ReconcileError>;

    /// Replace an existing key.
    async fn overwrite_key(&self, dev_eui: &str, nwk_key: &str) -> Result<(), ReconcileError>;
}
