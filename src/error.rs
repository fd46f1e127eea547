//! Crate-level error types.
//!
//! Errors come in two layers:
//! - [`DeviceError`]: what a [`DeviceSession`](crate::DeviceSession) transport reports.
//! - [`Error`]: what the synchronisation core reports, classified by how the
//!   polling loop recovers from it.
//!
//! Only [`Error::Connection`] and [`Error::InvalidConfig`] are fatal. Every other
//! variant is recovered inside the loop by skipping work for the current tick.

use std::fmt;

/// Errors reported by a device transport.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device slot exists but the device is not connected.
    #[error("device not connected")]
    NotConnected,

    /// No device is registered under this slot number.
    #[error("unknown device slot {0}")]
    UnknownDevice(u32),

    /// The channel does not exist or is not enabled.
    #[error("channel {channel} is not available")]
    InvalidChannel { channel: u32 },

    /// Pointer or sample count outside the channel buffer.
    #[error("transfer of {count} samples at {pointer} exceeds buffer of {capacity}")]
    OutOfRange {
        pointer: u32,
        count: u32,
        capacity: u32,
    },

    /// A native library call returned a non-zero status code.
    #[error("{op} failed with status {code}")]
    Status { op: &'static str, code: i32 },

    /// The transport library itself is unusable (not loaded, not initialised).
    #[error("device library error: {0}")]
    Library(String),

    /// A free-form message.
    #[error("{0}")]
    Message(String),
}

impl DeviceError {
    /// Create a free-form device error.
    pub fn msg(msg: impl Into<String>) -> Self {
        Self::Message(msg.into())
    }

    /// Returns true if the error means the device is gone rather than the request being bad.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::NotConnected | Self::UnknownDevice(_))
    }
}

/// Which step of bringing a device up failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStage {
    /// Pushing the device configuration.
    SetConfig,
    /// Starting acquisition (and playback, if enabled).
    Start,
}

impl fmt::Display for ConfigStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigStage::SetConfig => write!(f, "set config"),
            ConfigStage::Start => write!(f, "start"),
        }
    }
}

/// Direction of a channel transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    /// Reading ADC samples from the device.
    Read,
    /// Writing DAC samples to the device.
    Write,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoOp::Read => write!(f, "read"),
            IoOp::Write => write!(f, "write"),
        }
    }
}

/// Crate-level error type.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Session creation or add-device failure. Aborts startup.
    #[error("{context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: DeviceError,
    },

    /// The per-tick state query failed; the tick is skipped.
    #[error("state query failed: {0}")]
    StateQuery(#[source] DeviceError),

    /// Pushing the configuration or starting the device failed; retried next tick.
    #[error("{stage} failed: {source}")]
    Configuration {
        stage: ConfigStage,
        #[source]
        source: DeviceError,
    },

    /// A channel read or write failed.
    #[error("channel {channel} {op} failed: {source}")]
    Io {
        op: IoOp,
        channel: u32,
        #[source]
        source: DeviceError,
    },

    /// Stopping the device failed. Never fatal.
    #[error("stop failed: {0}")]
    Stop(#[source] DeviceError),

    /// Caller-supplied configuration was rejected before reaching the device.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a connection error with context.
    pub fn connection(context: impl Into<String>, source: DeviceError) -> Self {
        Self::Connection {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Returns true if the error terminates the program rather than the current tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::InvalidConfig(_))
    }

    /// The underlying device error, if any.
    pub fn device_error(&self) -> Option<&DeviceError> {
        match self {
            Self::Connection { source, .. }
            | Self::Configuration { source, .. }
            | Self::Io { source, .. } => Some(source),
            Self::StateQuery(source) | Self::Stop(source) => Some(source),
            Self::InvalidConfig(_) => None,
        }
    }
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for device transport calls.
pub type DeviceResult<T> = std::result::Result<T, DeviceError>;
