use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

/// One `(devEUI, nwkKey)` observation from a manufacturing batch, in file order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyRow {
    pub dev_eui: String,
    pub nwk_key: String,
}

impl KeyRow {
    pub fn new(dev_eui: impl Into<String>, nwk_key: impl Into<String>) -> Self {
        Self {
            dev_eui: dev_eui.into(),
            nwk_key: nwk_key.into(),
        }
    }
}

/// Everything the batch says about one device.
///
/// `latest_key` is always a member of `observed_keys`, and `observed_keys`
/// is never empty. Both are only mutated through [`DeviceRecord::observe`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRecord {
    dev_eui: String,
    latest_key: String,
    /// Distinct keys in first-seen order.
    observed_keys: IndexSet<String>,
}

impl DeviceRecord {
    pub fn new(dev_eui: impl Into<String>, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut observed_keys = IndexSet::new();
        observed_keys.insert(key.clone());
        Self {
            dev_eui: dev_eui.into(),
            latest_key: key,
            observed_keys,
        }
    }

    /// Record a later occurrence of this device. The new key wins.
    pub fn observe(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.observed_keys.insert(key.clone());
        self.latest_key = key;
    }

    pub fn dev_eui(&self) -> &str {
        &self.dev_eui
    }

    pub fn latest_key(&self) -> &str {
        &self.latest_key
    }

    pub fn observed_keys(&self) -> &IndexSet<String> {
        &self.observed_keys
    }

    pub fn key_count(&self) -> usize {
        self.observed_keys.len()
    }

    pub fn has_multiple_keys(&self) -> bool {
        self.observed_keys.len() > 1
    }
}

/// devEUI -> record, iterated in first-occurrence order.
pub type DeviceMap = IndexMap<String, DeviceRecord>;

/// Terminal classification of one device against the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    /// Registry has never heard of the device.
    DeviceMissing,
    /// Device exists but has no key provisioned.
    KeyMissing,
    /// Stored key differs from the batch's latest key.
    KeyMismatch,
    /// Stored key equals the batch's latest key.
    Ok,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::DeviceMissing => "DEVICE_MISSING",
            Classification::KeyMissing => "KEY_MISSING",
            Classification::KeyMismatch => "KEY_MISMATCH",
            Classification::Ok => "OK",
        }
    }

    /// `true` for every classification that has a corrective write.
    pub fn needs_write(&self) -> bool {
        !matches!(self, Classification::Ok)
    }
}

/// What happened to the corrective write for a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteAction {
    /// Nothing to write (classification `OK`).
    NotNeeded,
    /// A write was needed but writes are disabled for this run.
    Suppressed,
    /// The write was issued and the registry accepted it.
    Applied,
    /// The write was issued and failed; see the matching [`DeviceFailure`].
    Failed,
}

/// Per-device result of a reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceOutcome {
    pub dev_eui: String,
    pub classification: Classification,
    /// Number of distinct keys the batch carried for this device.
    pub key_count: usize,
    pub write: WriteAction,
}

/// Where in the per-device state machine a registry call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureStage {
    /// Reading device or key state; the device was never classified.
    Query,
    /// Creating an absent device; nothing was written.
    Create,
    /// Device was created but the key was not provisioned. The registry now
    /// holds a keyless device, which the next run classifies `KEY_MISSING`.
    PartialCreate,
    Provision,
    Overwrite,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceFailure {
    pub dev_eui: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Aggregate counters for one run.
///
/// The classification counters (`missing_devices`, `missing_keys`,
/// `mismatched`, `ok`) count what the registry held when the device was
/// queried, not what was fixed. A device whose corrective write failed is
/// counted under its classification and again in `failed`; one that was
/// fixed also adds to `writes_applied`. Devices whose query failed appear
/// only in `failed`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub devices: usize,
    /// Absent from the registry (created only when the write succeeded).
    pub missing_devices: usize,
    /// Present without a key.
    pub missing_keys: usize,
    /// Present with a key other than the batch's latest.
    pub mismatched: usize,
    pub ok: usize,
    /// `OK` devices for which the batch carried more than one key.
    pub ok_despite_multiple_keys: usize,
    pub writes_applied: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    pub(crate) fn count(&mut self, outcome: &DeviceOutcome) {
        match outcome.classification {
            Classification::DeviceMissing => self.missing_devices += 1,
            Classification::KeyMissing => self.missing_keys += 1,
            Classification::KeyMismatch => self.mismatched += 1,
            Classification::Ok => {
                self.ok += 1;
                if outcome.key_count > 1 {
                    self.ok_despite_multiple_keys += 1;
                }
            }
        }
        if outcome.write == WriteAction::Applied {
            self.writes_applied += 1;
        }
    }
}

/// Full report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub writes_enabled: bool,
    pub outcomes: Vec<DeviceOutcome>,
    pub failures: Vec<DeviceFailure>,
    pub summary: ReconcileSummary,
}

impl ReconcileReport {
    pub fn new(writes_enabled: bool) -> Self {
        Self {
            writes_enabled,
            outcomes: Vec::new(),
            failures: Vec::new(),
            summary: ReconcileSummary::default(),
        }
    }

    pub fn classification_of(&self, dev_eui: &str) -> Option<Classification> {
        self.outcomes
            .iter()
            .find(|o| o.dev_eui == dev_eui)
            .map(|o| o.classification)
    }

    /// `true` when every device was reachable and already correct.
    pub fn is_consistent(&self) -> bool {
        self.failures.is_empty()
            && self
                .outcomes
                .iter()
                .all(|o| o.classification == Classification::Ok)
    }
}
