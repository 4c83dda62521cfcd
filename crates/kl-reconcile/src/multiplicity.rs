use tracing::warn;

use crate::DeviceMap;

/// A device that came off the jig with more than one key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiKeyDiagnostic {
    pub dev_eui: String,
    pub key_count: usize,
    /// Distinct keys in first-seen order.
    pub keys: Vec<String>,
}

/// Warn about every device whose batch history holds several distinct keys.
///
/// Usually a jig retry that did not clear state. Observational only: the
/// returned diagnostics mirror what was logged.
pub fn report_multiple_keys(devices: &DeviceMap) -> Vec<MultiKeyDiagnostic> {
    let mut out = Vec::new();

    for rec in devices.values().filter(|r| r.has_multiple_keys()) {
        let keys: Vec<String> = rec.observed_keys().iter().cloned().collect();
        warn!(
            dev_eui = rec.dev_eui(),
            key_count = rec.key_count(),
            keys = ?keys,
            "{} keys generated for {}",
            rec.key_count(),
            rec.dev_eui()
        );
        out.push(MultiKeyDiagnostic {
            dev_eui: rec.dev_eui().to_string(),
            key_count: rec.key_count(),
            keys,
        });
    }

    out
}
