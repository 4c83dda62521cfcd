use tracing::{error, info, warn};

use crate::{
    Classification, DeviceFailure, DeviceMap, DeviceOutcome, DeviceRecord, FailureStage,
    ReconcileError, ReconcileReport, ReconcileSummary, Registry, WriteAction,
};

/// What to do when a registry call fails for one device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Record the failure against the device and move on to the next one.
    #[default]
    Continue,
    /// Stop the run and return the error. Devices already handled keep
    /// whatever was written for them.
    FailFast,
}

/// Run options. The default performs no writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub writes_enabled: bool,
    pub error_policy: ErrorPolicy,
}

impl ReconcileOptions {
    pub fn with_writes(mut self, writes_enabled: bool) -> Self {
        self.writes_enabled = writes_enabled;
        self
    }

    pub fn with_error_policy(mut self, error_policy: ErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }
}

/// Observed registry state for one device.
enum RegistryState {
    Absent,
    Present { stored_key: Option<String> },
}

async fn query<R: Registry + ?Sized>(
    registry: &R,
    dev_eui: &str,
) -> Result<RegistryState, ReconcileError> {
    if registry.fetch_device(dev_eui).await?.is_none() {
        return Ok(RegistryState::Absent);
    }
    let stored_key = registry.fetch_key(dev_eui).await?;
    Ok(RegistryState::Present { stored_key })
}

fn classify(state: &RegistryState, rec: &DeviceRecord) -> Classification {
    match state {
        RegistryState::Absent => Classification::DeviceMissing,
        RegistryState::Present { stored_key: None } => Classification::KeyMissing,
        RegistryState::Present {
            stored_key: Some(k),
        } if k != rec.latest_key() => Classification::KeyMismatch,
        RegistryState::Present { .. } => Classification::Ok,
    }
}

fn log_classification(rec: &DeviceRecord, c: Classification) {
    let dev_eui = rec.dev_eui();
    match c {
        Classification::DeviceMissing => warn!(dev_eui, "no device {}", dev_eui),
        Classification::KeyMissing => warn!(dev_eui, "no keys provisioned for device {}", dev_eui),
        Classification::KeyMismatch => error!(
            dev_eui,
            key_count = rec.key_count(),
            "keys do not match for device {} ({} generated)",
            dev_eui,
            rec.key_count()
        ),
        Classification::Ok => {
            info!(dev_eui, "keys match for device {}", dev_eui);
            if rec.has_multiple_keys() {
                info!(dev_eui, "(despite {} generated keys)", rec.key_count());
            }
        }
    }
}

/// Issue the corrective write for `c`. Creation and provisioning are two
/// calls; a failure between them is reported as [`FailureStage::PartialCreate`].
async fn apply_write<R: Registry + ?Sized>(
    registry: &R,
    rec: &DeviceRecord,
    c: Classification,
) -> Result<(), (FailureStage, ReconcileError)> {
    let dev_eui = rec.dev_eui();
    let key = rec.latest_key();
    match c {
        Classification::DeviceMissing => {
            registry
                .create_device(dev_eui)
                .await
                .map_err(|e| (FailureStage::Create, e))?;
            registry
                .provision_key(dev_eui, key)
                .await
                .map_err(|e| (FailureStage::PartialCreate, e))
        }
        Classification::KeyMissing => registry
            .provision_key(dev_eui, key)
            .await
            .map_err(|e| (FailureStage::Provision, e)),
        Classification::KeyMismatch => registry
            .overwrite_key(dev_eui, key)
            .await
            .map_err(|e| (FailureStage::Overwrite, e)),
        Classification::Ok => Ok(()),
    }
}

fn log_failure(dev_eui: &str, stage: FailureStage, err: &ReconcileError) {
    match stage {
        FailureStage::PartialCreate => error!(
            dev_eui,
            error = %err,
            "device {} was created but its key was not provisioned; \
             it stays keyless until the next run",
            dev_eui
        ),
        _ => error!(dev_eui, stage = ?stage, error = %err, "reconcile failed for device {}", dev_eui),
    }
}

/// Check every device in `devices` against the registry and, when writes are
/// enabled, drive the registry toward the batch.
///
/// Devices are processed one at a time in map order. With
/// [`ErrorPolicy::Continue`] this never returns `Err`; failures are in the
/// report. With [`ErrorPolicy::FailFast`] the first registry failure is
/// returned and later devices are not attempted.
///
/// Not safe against a concurrent run on the same registry: both runs race on
/// create/provision.
pub async fn reconcile<R: Registry + ?Sized>(
    registry: &R,
    devices: &DeviceMap,
    opts: &ReconcileOptions,
) -> Result<ReconcileReport, ReconcileError> {
    let mut report = ReconcileReport::new(opts.writes_enabled);
    report.summary.devices = devices.len();

    if !opts.writes_enabled {
        info!("dry run: registry writes are disabled (pass --write to apply corrections)");
    }

    for rec in devices.values() {
        let dev_eui = rec.dev_eui();

        let state = match query(registry, dev_eui).await {
            Ok(s) => s,
            Err(e) => {
                log_failure(dev_eui, FailureStage::Query, &e);
                if opts.error_policy == ErrorPolicy::FailFast {
                    return Err(e);
                }
                report.failures.push(DeviceFailure {
                    dev_eui: dev_eui.to_string(),
                    stage: FailureStage::Query,
                    error: e.to_string(),
                });
                report.summary.failed += 1;
                continue;
            }
        };

        let classification = classify(&state, rec);
        log_classification(rec, classification);

        let write = if !classification.needs_write() {
            WriteAction::NotNeeded
        } else if !opts.writes_enabled {
            WriteAction::Suppressed
        } else {
            match apply_write(registry, rec, classification).await {
                Ok(()) => WriteAction::Applied,
                Err((stage, e)) => {
                    log_failure(dev_eui, stage, &e);
                    if opts.error_policy == ErrorPolicy::FailFast {
                        return Err(e);
                    }
                    report.failures.push(DeviceFailure {
                        dev_eui: dev_eui.to_string(),
                        stage,
                        error: e.to_string(),
                    });
                    report.summary.failed += 1;
                    WriteAction::Failed
                }
            }
        };

        let outcome = DeviceOutcome {
            dev_eui: dev_eui.to_string(),
            classification,
            key_count: rec.key_count(),
            write,
        };
        report.summary.count(&outcome);
        report.outcomes.push(outcome);
    }

    log_summary(&report.summary);
    Ok(report)
}

fn log_summary(s: &ReconcileSummary) {
    warn!("{} devices not stored", s.missing_devices);
    warn!("{} devices missing keys", s.missing_keys);
    warn!("{} devices wrong key stored", s.mismatched);
    info!(
        "{} devices were correct despite multiple keys generated",
        s.ok_despite_multiple_keys
    );
    if s.failed > 0 {
        error!("{} devices could not be reconciled", s.failed);
    }
}
