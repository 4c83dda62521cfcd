use tracing::debug;

use crate::{DeviceMap, DeviceRecord, KeyRow};

/// Column holding the device identifier in manufacturing exports.
pub const DEV_EUI_HEADER: &str = "devEUI";
/// Column holding the network key in manufacturing exports.
pub const NWK_KEY_HEADER: &str = "nwkKey";

/// True for a devEUI cell that is really a repeated header line. Matches the
/// batch reader's header lookup: case-insensitive, surrounding whitespace ignored.
pub fn is_embedded_header(dev_eui: &str) -> bool {
    dev_eui.trim().eq_ignore_ascii_case(DEV_EUI_HEADER)
}

/// Fold a batch of rows into a per-device map.
///
/// Rows are applied in order, so the last row for a device decides its
/// `latest_key`. Concatenated exports carry their header line in the middle
/// of the data; a row whose devEUI is literally the header name is dropped.
pub fn build_device_map<I>(rows: I) -> DeviceMap
where
    I: IntoIterator<Item = KeyRow>,
{
    let mut devices = DeviceMap::new();

    for row in rows {
        if is_embedded_header(&row.dev_eui) {
            debug!("ignoring embedded header row");
            continue;
        }

        match devices.get_mut(&row.dev_eui) {
            Some(rec) => rec.observe(row.nwk_key),
            None => {
                let rec = DeviceRecord::new(row.dev_eui.clone(), row.nwk_key);
                devices.insert(row.dev_eui, rec);
            }
        }
    }

    devices
}
