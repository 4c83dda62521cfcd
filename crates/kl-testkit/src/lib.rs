//! Deterministic in-memory device registry.
//!
//! Behaves like the network server as far as the reconcile engine can tell:
//! - unknown devEUI => fetches return `None`
//! - `create_device` on an existing device fails (the server rejects it)
//! - `provision_key` / `overwrite_key` on an unknown device => `NotFound`
//!
//! Failures can be injected per `(operation, devEUI)` to exercise partial
//! writes and error containment. Every call is recorded in order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use kl_reconcile::{ReconcileError, Registry, RegistryDevice, RegistryOp};

/// One recorded registry call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegistryCall {
    pub op: RegistryOp,
    pub dev_eui: String,
}

#[derive(Debug, Default)]
struct Inner {
    /// devEUI -> stored key (`None` = present but keyless)
    devices: BTreeMap<String, Option<String>>,
    faults: BTreeSet<(&'static str, String)>,
    calls: Vec<RegistryCall>,
}

#[derive(Debug, Default)]
pub struct MemoryRegistry {
    inner: Mutex<Inner>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a present device with an optional stored key.
    pub fn with_device(self, dev_eui: &str, stored_key: Option<&str>) -> Self {
        self.lock()
            .devices
            .insert(dev_eui.to_string(), stored_key.map(str::to_string));
        self
    }

    /// Make every `op` call for `dev_eui` fail with a remote failure.
    pub fn fail_on(self, op: RegistryOp, dev_eui: &str) -> Self {
        self.lock().faults.insert((op.as_str(), dev_eui.to_string()));
        self
    }

    /// Remove a previously injected fault.
    pub fn heal(&self, op: RegistryOp, dev_eui: &str) {
        self.lock().faults.remove(&(op.as_str(), dev_eui.to_string()));
    }

    pub fn contains(&self, dev_eui: &str) -> bool {
        self.lock().devices.contains_key(dev_eui)
    }

    /// Stored key; `None` for keyless or absent devices.
    pub fn stored_key(&self, dev_eui: &str) -> Option<String> {
        self.lock().devices.get(dev_eui).cloned().flatten()
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.lock().calls.clone()
    }

    /// Number of recorded create/provision/overwrite calls.
    pub fn write_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| {
                matches!(
                    c.op,
                    RegistryOp::CreateDevice | RegistryOp::ProvisionKey | RegistryOp::OverwriteKey
                )
            })
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the registry state from the next assertion.
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Record the call and apply any injected fault.
    fn enter(&self, op: RegistryOp, dev_eui: &str) -> Result<MutexGuard<'_, Inner>, ReconcileError> {
        let mut g = self.lock();
        g.calls.push(RegistryCall {
            op,
            dev_eui: dev_eui.to_string(),
        });
        if g.faults.contains(&(op.as_str(), dev_eui.to_string())) {
            return Err(ReconcileError::remote(Some(dev_eui), op, "injected fault"));
        }
        Ok(g)
    }
}

fn not_found(dev_eui: &str) -> ReconcileError {
    ReconcileError::NotFound {
        dev_eui: dev_eui.to_string(),
        object: "device",
    }
}

#[async_trait::async_trait]
impl Registry for MemoryRegistry {
    async fn fetch_device(&self, dev_eui: &str) -> Result<Option<RegistryDevice>, ReconcileError> {
        let g = self.enter(RegistryOp::FetchDevice, dev_eui)?;
        Ok(g.devices
            .contains_key(dev_eui)
            .then(|| RegistryDevice::new(dev_eui)))
    }

    async fn fetch_key(&self, dev_eui: &str) -> Result<Option<String>, ReconcileError> {
        let g = self.enter(RegistryOp::FetchKey, dev_eui)?;
        Ok(g.devices.get(dev_eui).cloned().flatten())
    }

    async fn create_device(&self, dev_eui: &str) -> Result<(), ReconcileError> {
        let mut g = self.enter(RegistryOp::CreateDevice, dev_eui)?;
        if g.devices.contains_key(dev_eui) {
            return Err(ReconcileError::remote(
                Some(dev_eui),
                RegistryOp::CreateDevice,
                "object already exists",
            ));
        }
        g.devices.insert(dev_eui.to_string(), None);
        Ok(())
    }

    async fn provision_key(&self, dev_eui: &str, nwk_key: &str) -> Result<(), ReconcileError> {
        let mut g = self.enter(RegistryOp::ProvisionKey, dev_eui)?;
        match g.devices.get_mut(dev_eui) {
            Some(slot) => {
                *slot = Some(nwk_key.to_string());
                Ok(())
            }
            None => Err(not_found(dev_eui)),
        }
    }

    async fn overwrite_key(&self, dev_eui: &str, nwk_key: &str) -> Result<(), ReconcileError> {
        let mut g = self.enter(RegistryOp::OverwriteKey, dev_eui)?;
        match g.devices.get_mut(dev_eui) {
            Some(slot) => {
                *slot = Some(nwk_key.to_string());
                Ok(())
            }
            None => Err(not_found(dev_eui)),
        }
    }
}
