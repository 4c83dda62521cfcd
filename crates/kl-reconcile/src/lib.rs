//! kl-reconcile
//!
//! Device key reconciliation between a manufacturing batch and a LoRa
//! network-server registry.
//!
//! Architectural decisions:
//! - Last occurrence of a devEUI in the batch wins
//! - Every distinct key seen for a device is kept for diagnostics only
//! - Writes are opt-in; classification happens either way
//! - A registry failure is contained to the device it happened on
//!   (unless the caller asks for fail-fast)
//!
//! The loader and reporter are pure. The engine talks to the registry only
//! through the [`Registry`] trait; transport lives in `kl-registry`.

mod engine;
mod error;
mod loader;
mod multiplicity;
mod registry;
mod types;

pub use engine::{reconcile, ErrorPolicy, ReconcileOptions};
pub use error::{ReconcileError, RegistryOp};
pub use loader::{build_device_map, is_embedded_header, DEV_EUI_HEADER, NWK_KEY_HEADER};
pub use multiplicity::{report_multiple_keys, MultiKeyDiagnostic};
pub use registry::{Registry, RegistryDevice};
pub use types::*;
