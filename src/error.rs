//! Unified error types for the codec engine server.
//!
//! Every subsystem converts into the single [`DceError`] enum, so handler
//! pipelines can use `?` throughout and the dispatcher has one place that
//! maps failures onto wire error codes. All variants are `Copy`.

use core::fmt;

use crate::registry::SlotKind;

// ---------------------------------------------------------------------------
// Top-level server error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DceError {
    /// Request parameter count does not match the operation signature.
    InvalidArgumentCount { expected: u8, got: u8 },
    /// A parameter has the wrong shape or an illegal value.
    InvalidArgument(&'static str),
    /// The registry is full at client, engine or codec granularity.
    CapacityExceeded(SlotKind),
    /// A handle is not tracked for the calling client.
    UnknownHandle,
    /// A handle is already tracked by some client.
    DuplicateHandle,
    /// An engine or codec operation failed; carries its status verbatim.
    HardwareOperationFailed(i32),
    /// Buffer relocation was requested but is not implemented.
    RelocationUnsupported,
    /// Shared memory could not be accessed.
    Memory(MemoryError),
    /// The request frame could not be decoded or encoded.
    Wire(WireError),
    /// Configuration is invalid.
    Config(ConfigError),
    /// The accelerator never went idle for a disconnecting client.
    /// In-flight work cannot be revoked, so this is fatal to the server.
    AcceleratorWedged,
}

impl DceError {
    /// Stable one-byte error code carried in response frames. Zero is success.
    pub const fn code(self) -> u8 {
        match self {
            Self::InvalidArgumentCount { .. } => 1,
            Self::InvalidArgument(_) => 2,
            Self::CapacityExceeded(_) => 3,
            Self::UnknownHandle => 4,
            Self::HardwareOperationFailed(_) => 5,
            Self::RelocationUnsupported => 6,
            Self::Memory(_) => 7,
            Self::Wire(_) => 8,
            Self::Config(_) => 9,
            Self::AcceleratorWedged => 10,
            Self::DuplicateHandle => 11,
        }
    }

    /// True when the server can no longer make progress.
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::AcceleratorWedged)
    }
}

impl fmt::Display for DceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgumentCount { expected, got } => {
                write!(f, "expected {expected} arguments, got {got}")
            }
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::CapacityExceeded(kind) => write!(f, "no free {kind} slot"),
            Self::UnknownHandle => write!(f, "unknown handle"),
            Self::DuplicateHandle => write!(f, "handle already registered"),
            Self::HardwareOperationFailed(status) => {
                write!(f, "hardware operation failed (status {status})")
            }
            Self::RelocationUnsupported => write!(f, "buffer relocation unsupported"),
            Self::Memory(e) => write!(f, "shared memory: {e}"),
            Self::Wire(e) => write!(f, "wire: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::AcceleratorWedged => write!(f, "accelerator failed to go idle"),
        }
    }
}

impl core::error::Error for DceError {}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// Every client slot is in use.
    ClientTableFull,
    /// The client's set for this kind has no free slot.
    SetFull(SlotKind),
    /// The handle is not in the client's set.
    UnknownHandle,
    /// No client slot exists for the connection.
    UnknownClient,
    /// The handle is already tracked somewhere in the table.
    DuplicateHandle,
    /// The client's last engine still has codecs tracked against it.
    CodecsOutstanding,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientTableFull => write!(f, "client table full"),
            Self::SetFull(kind) => write!(f, "{kind} set full"),
            Self::UnknownHandle => write!(f, "handle not registered"),
            Self::UnknownClient => write!(f, "client not registered"),
            Self::DuplicateHandle => write!(f, "handle registered twice"),
            Self::CodecsOutstanding => write!(f, "codecs still open on last engine"),
        }
    }
}

impl From<RegistryError> for DceError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::ClientTableFull => Self::CapacityExceeded(SlotKind::Client),
            RegistryError::SetFull(kind) => Self::CapacityExceeded(kind),
            RegistryError::UnknownHandle | RegistryError::UnknownClient => Self::UnknownHandle,
            RegistryError::DuplicateHandle => Self::DuplicateHandle,
            RegistryError::CodecsOutstanding => Self::InvalidArgument("codecs still open on last engine"),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared memory errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The region does not belong to any mapped carveout.
    Unmapped,
    /// The region runs past the end of its mapping.
    OutOfBounds,
    /// The region is shorter than the structure expected there.
    TooShort,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmapped => write!(f, "region not mapped"),
            Self::OutOfBounds => write!(f, "region out of bounds"),
            Self::TooShort => write!(f, "region too short"),
        }
    }
}

impl core::error::Error for MemoryError {}

impl From<MemoryError> for DceError {
    fn from(e: MemoryError) -> Self {
        Self::Memory(e)
    }
}

// ---------------------------------------------------------------------------
// Wire errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Payload did not decode as a request.
    Malformed,
    /// Encoded payload exceeds the frame limit.
    Oversize,
    /// Serialisation failed.
    Encode,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed payload"),
            Self::Oversize => write!(f, "payload exceeds frame limit"),
            Self::Encode => write!(f, "encoding failed"),
        }
    }
}

impl core::error::Error for WireError {}

impl From<WireError> for DceError {
    fn from(e: WireError) -> Self {
        Self::Wire(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    EmptyName,
    /// `max_clients` is zero or above the table's storage bound.
    ClientsOutOfRange,
    /// A per-client set capacity is zero or above the storage bound.
    CapacityOutOfRange,
    EmptyVersionBuffer,
    DebugLevel(u8),
    /// The config text is not valid JSON for [`crate::config::ServerConfig`].
    Unparseable,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "server name is empty"),
            Self::ClientsOutOfRange => write!(f, "max_clients out of range"),
            Self::CapacityOutOfRange => write!(f, "per-client capacity out of range"),
            Self::EmptyVersionBuffer => write!(f, "version buffer size is zero"),
            Self::DebugLevel(level) => write!(f, "debug level {level} above maximum"),
            Self::Unparseable => write!(f, "unparseable JSON"),
        }
    }
}

impl core::error::Error for ConfigError {}

impl From<ConfigError> for DceError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, DceError>;
