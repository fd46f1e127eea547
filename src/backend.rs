//! Device transport trait.
//!
//! This module provides the [`DeviceSession`] trait that every transport to a
//! ZET 017 device implements: the vendor TCP library ([`NativeSession`], feature
//! `native`) or an in-process mock for tests. The synchronisation core only ever
//! talks to this trait.
//!
//! [`NativeSession`]: crate::native::NativeSession

use crate::error::DeviceResult;
use crate::types::{DeviceConfig, DeviceInfo, DeviceState};

/// A session with the device-communication layer.
///
/// A session owns the connection management and the device-side buffers for
/// any number of device slots, numbered in the order they were added.
/// Creating a session is the implementation's constructor.
///
/// # Channel transfers
///
/// `read_channel` and `write_channel` address a circular per-channel buffer.
/// A transfer at `pointer` of `n` samples covers the `n` samples **ending** at
/// `pointer`, wrapping at the buffer capacity. Implementations must reject
/// `pointer >= capacity` and `n > capacity` with [`DeviceError::OutOfRange`].
///
/// # Threading
///
/// All calls into one session are made from a single thread. Implementations
/// serialise their own internal access to the connection.
///
/// [`DeviceError::OutOfRange`]: crate::DeviceError::OutOfRange
pub trait DeviceSession: Send + 'static {
    /// Short transport name for logs.
    fn transport(&self) -> &str;

    /// Register a device by IP address and return its slot number.
    ///
    /// Connection happens in the background; poll [`state`](Self::state) to
    /// observe it.
    fn add_device(&mut self, ip: &str) -> DeviceResult<u32>;

    /// Unregister a device by IP address.
    fn remove_device(&mut self, ip: &str) -> DeviceResult<()>;

    /// Current connection and buffer state of a device slot.
    fn state(&mut self, device: u32) -> DeviceResult<DeviceState>;

    /// Identity of the device in a slot.
    fn info(&mut self, device: u32) -> DeviceResult<DeviceInfo>;

    /// Configuration currently active on the device.
    fn config(&mut self, device: u32) -> DeviceResult<DeviceConfig>;

    /// Push a new configuration. Requires a connected device.
    fn set_config(&mut self, device: u32, config: &DeviceConfig) -> DeviceResult<()>;

    /// Start acquisition, and playback if `enable_output` is set.
    fn start(&mut self, device: u32, enable_output: bool) -> DeviceResult<()>;

    /// Stop acquisition and playback.
    fn stop(&mut self, device: u32) -> DeviceResult<()>;

    /// Copy `data.len()` ADC samples ending at `pointer` into `data`.
    fn read_channel(
        &mut self,
        device: u32,
        channel: u32,
        pointer: u32,
        data: &mut [f32],
    ) -> DeviceResult<()>;

    /// Copy `data` into the DAC ring so that it ends at `pointer`.
    fn write_channel(
        &mut self,
        device: u32,
        channel: u32,
        pointer: u32,
        data: &[f32],
    ) -> DeviceResult<()>;

    /// Release the session. Further calls fail; closing twice is a no-op.
    fn close(&mut self) -> DeviceResult<()>;
}
