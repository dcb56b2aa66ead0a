//! Classification of application errors reported by the server
//!
//! A failed call carries an `ErrorDescription` list: the first element is a
//! protocol error code, the rest are positional parameters. [`ErrorKind`]
//! names every code the client knows about; anything else is
//! [`ErrorKind::Generic`].

use std::fmt;

use thiserror::Error;

macro_rules! error_kinds {
    ($($(#[$doc:meta])* $variant:ident => $code:literal,)+) => {
        /// Semantic kind of an application error
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ErrorKind {
            $($(#[$doc])* $variant,)+
            /// Any code not listed above
            Generic,
        }

        impl ErrorKind {
            /// Every specific kind, in declaration order
            pub const KNOWN: &'static [ErrorKind] = &[$(ErrorKind::$variant,)+];

            /// Map a protocol error code to its kind
            pub fn classify(code: &str) -> ErrorKind {
                match code {
                    $($code => ErrorKind::$variant,)+
                    // Misspelling carried by older servers
                    "SR_HAS_PDB" => ErrorKind::SrHasPbd,
                    _ => ErrorKind::Generic,
                }
            }

            /// Wire code of this kind; `None` for [`ErrorKind::Generic`]
            pub fn code(&self) -> Option<&'static str> {
                match self {
                    $(ErrorKind::$variant => Some($code),)+
                    ErrorKind::Generic => None,
                }
            }
        }
    };
}

error_kinds! {
    /// The bootloader returned an error
    BootloaderFailed => "BOOTLOADER_FAILED",
    /// The device is not currently attached
    DeviceAlreadyDetached => "DEVICE_ALREADY_DETACHED",
    /// The VM rejected the attempt to detach the device
    DeviceDetachRejected => "DEVICE_DETACH_REJECTED",
    /// Events were lost from the queue
    EventsLost => "EVENTS_LOST",
    /// The operation would break the HA failover plan
    HaOperationWouldBreakFailoverPlan => "HA_OPERATION_WOULD_BREAK_FAILOVER_PLAN",
    /// The host is not the pool master; first parameter is the master's address
    HostIsSlave => "HOST_IS_SLAVE",
    HostNameInvalid => "HOST_NAME_INVALID",
    HostNotEnoughFreeMemory => "HOST_NOT_ENOUGH_FREE_MEMORY",
    IsTunnelAccessPif => "IS_TUNNEL_ACCESS_PIF",
    JoiningHostCannotContainSharedSrs => "JOINING_HOST_CANNOT_CONTAIN_SHARED_SRS",
    LicenceRestriction => "LICENCE_RESTRICTION",
    LicenseProcessingError => "LICENSE_PROCESSING_ERROR",
    /// The server found no host able to run the operation
    NoHostsAvailable => "NO_HOSTS_AVAILABLE",
    OpenvswitchNotActive => "OPENVSWITCH_NOT_ACTIVE",
    OperationNotAllowed => "OPERATION_NOT_ALLOWED",
    OtherOperationInProgress => "OTHER_OPERATION_IN_PROGRESS",
    PifIsPhysical => "PIF_IS_PHYSICAL",
    PifTunnelStillExists => "PIF_TUNNEL_STILL_EXISTS",
    /// Wrong credentials; no session was issued
    SessionAuthenticationFailed => "SESSION_AUTHENTICATION_FAILED",
    /// The session token expired or was never valid
    SessionInvalid => "SESSION_INVALID",
    SessionNotRegistered => "SESSION_NOT_REGISTERED",
    SrFull => "SR_FULL",
    SrHasPbd => "SR_HAS_PBD",
    SrOperationNotSupported => "SR_OPERATION_NOT_SUPPORTED",
    SrUnknownDriver => "SR_UNKNOWN_DRIVER",
    TransportPifNotConfigured => "TRANSPORT_PIF_NOT_CONFIGURED",
    UnknownBootloader => "UNKNOWN_BOOTLOADER",
    VbdIsEmpty => "VBD_IS_EMPTY",
    VbdNotEmpty => "VBD_NOT_EMPTY",
    VbdNotRemovableMedia => "VBD_NOT_REMOVABLE_MEDIA",
    VlanTagInvalid => "VLAN_TAG_INVALID",
    /// Parameters: VM handle, expected state, actual state
    VmBadPowerState => "VM_BAD_POWER_STATE",
    VmCheckpointResumeFailed => "VM_CHECKPOINT_RESUME_FAILED",
    VmCheckpointSuspendFailed => "VM_CHECKPOINT_SUSPEND_FAILED",
    VmHvmRequired => "VM_HVM_REQUIRED",
    VmIsTemplate => "VM_IS_TEMPLATE",
    VmMigrateFailed => "VM_MIGRATE_FAILED",
    VmMissingPvDrivers => "VM_MISSING_PV_DRIVERS",
    VmRequiresSr => "VM_REQUIRES_SR",
    VmRevertFailed => "VM_REVERT_FAILED",
    VmSnapshotWithQuiesceFailed => "VM_SNAPSHOT_WITH_QUIESCE_FAILED",
    VmSnapshotWithQuiesceNotSupported => "VM_SNAPSHOT_WITH_QUIESCE_NOT_SUPPORTED",
    VmSnapshotWithQuiescePluginDoesNotRespond => "VM_SNAPSHOT_WITH_QUIESCE_PLUGIN_DOES_NOT_RESPOND",
    VmSnapshotWithQuiesceTimeout => "VM_SNAPSHOT_WITH_QUIESCE_TIMEOUT",
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code().unwrap_or("GENERIC"))
    }
}

/// A classified application error with its positional parameters
///
/// For a specific kind, `params` holds the elements after the code. For
/// [`ErrorKind::Generic`] it holds the original description unchanged, code
/// included, so nothing the server said is lost.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {}", .params.join(", "))]
pub struct ApiError {
    pub kind: ErrorKind,
    pub params: Vec<String>,
}

impl ApiError {
    /// Classify a raw `ErrorDescription` list
    pub fn from_description(mut description: Vec<String>) -> Self {
        let kind = description
            .first()
            .map(|code| ErrorKind::classify(code))
            .unwrap_or(ErrorKind::Generic);

        if kind != ErrorKind::Generic {
            description.remove(0);
        }

        Self {
            kind,
            params: description,
        }
    }

    /// Wire code, including unknown ones
    pub fn code(&self) -> &str {
        match self.kind.code() {
            Some(code) => code,
            None => self.params.first().map(String::as_str).unwrap_or(""),
        }
    }

    /// Address of the pool master named by a `HOST_IS_SLAVE` error
    pub fn master_host(&self) -> Option<&str> {
        match self.kind {
            ErrorKind::HostIsSlave => self.params.first().map(String::as_str),
            _ => None,
        }
    }
}
