use std::fmt;

/// Registry operation a failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryOp {
    Login,
    FetchDevice,
    FetchKey,
    CreateDevice,
    ProvisionKey,
    OverwriteKey,
}

impl RegistryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryOp::Login => "login",
            RegistryOp::FetchDevice => "fetch_device",
            RegistryOp::FetchKey => "fetch_key",
            RegistryOp::CreateDevice => "create_device",
            RegistryOp::ProvisionKey => "provision_key",
            RegistryOp::OverwriteKey => "overwrite_key",
        }
    }
}

/// Closed error taxonomy for key reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileError {
    /// Device or key absent in the registry. The fetch operations turn this
    /// into `None`; it only surfaces as an error from a write.
    NotFound {
        dev_eui: String,
        object: &'static str,
    },
    /// Any other registry failure: transport, auth, malformed response,
    /// application error payload.
    RemoteFailure {
        dev_eui: Option<String>,
        op: RegistryOp,
        cause: String,
    },
    /// A batch record that could not be used. `row` is the 1-based line in
    /// the batch file.
    InputFormat { row: usize, reason: String },
}

impl ReconcileError {
    pub fn remote(dev_eui: Option<&str>, op: RegistryOp, cause: impl Into<String>) -> Self {
        ReconcileError::RemoteFailure {
            dev_eui: dev_eui.map(str::to_string),
            op,
            cause: cause.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::NotFound { .. })
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileError::NotFound { dev_eui, object } => {
                write!(f, "{object} not found for device {dev_eui}")
            }
            ReconcileError::RemoteFailure {
                dev_eui: Some(d),
                op,
                cause,
            } => write!(f, "registry {} failed for device {d}: {cause}", op.as_str()),
            ReconcileError::RemoteFailure {
                dev_eui: None,
                op,
                cause,
            } => write!(f, "registry {} failed: {cause}", op.as_str()),
            ReconcileError::InputFormat { row, reason } => {
                write!(f, "batch line {row}: {reason}")
            }
        }
    }
}

impl std::error::Error for ReconcileError {}
