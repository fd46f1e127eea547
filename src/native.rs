//! Binding to the vendor `zet017tcp` library.
//!
//! Enabled with the `native` feature. The library must be findable by the
//! linker; set `ZET017_LIB_DIR` to the directory holding `zet017tcp.dll` /
//! `libzet017tcp.so` if it is not on the default search path.
//!
//! # Slot numbering
//!
//! The library numbers devices by their position in its device list. Removing
//! a device shifts every later slot down by one; [`NativeSession`] mirrors
//! the list so that `add_device` can report the slot it created.

use std::ffi::{c_char, c_int, CString};
use std::ptr;

use log::debug;

use crate::backend::DeviceSession;
use crate::error::{DeviceError, DeviceResult, Error, Result};
use crate::types::{DeviceConfig, DeviceInfo, DeviceState};

// =============================================================================
// Library types
// =============================================================================

/// Opaque server handle.
#[repr(C)]
struct RawServer {
    _private: [u8; 0],
}

#[repr(C)]
#[derive(Default)]
struct RawConfig {
    sample_rate_adc: u32,
    sample_rate_dac: u32,
    mask_channel_adc: u32,
    mask_icp: u32,
    gain: [u32; 8],
}

#[repr(C)]
struct RawInfo {
    ip: [c_char; 16],
    name: [c_char; 16],
    serial: u32,
    version: [c_char; 32],
}

#[repr(C)]
#[derive(Default)]
struct RawState {
    connected: u16,
    reconnect: u64,
    pointer_adc: u32,
    buffer_size_adc: u32,
    pointer_dac: u32,
    buffer_size_dac: u32,
}

impl From<&DeviceConfig> for RawConfig {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            sample_rate_adc: config.sample_rate_adc,
            sample_rate_dac: config.sample_rate_dac,
            mask_channel_adc: config.mask_channel_adc,
            mask_icp: config.mask_icp,
            gain: config.gain,
        }
    }
}

impl From<RawConfig> for DeviceConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            sample_rate_adc: raw.sample_rate_adc,
            sample_rate_dac: raw.sample_rate_dac,
            mask_channel_adc: raw.mask_channel_adc,
            mask_icp: raw.mask_icp,
            gain: raw.gain,
        }
    }
}

impl From<RawState> for DeviceState {
    fn from(raw: RawState) -> Self {
        Self {
            connected: raw.connected != 0,
            reconnect_count: raw.reconnect,
            adc_write_pointer: raw.pointer_adc,
            adc_buffer_capacity: raw.buffer_size_adc,
            dac_read_pointer: raw.pointer_dac,
            dac_buffer_capacity: raw.buffer_size_dac,
        }
    }
}

/// Decode a fixed-size, NUL-padded C string field.
fn fixed_str(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|c| **c != 0)
        .map(|c| *c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

impl From<RawInfo> for DeviceInfo {
    fn from(raw: RawInfo) -> Self {
        Self {
            ip: fixed_str(&raw.ip),
            name: fixed_str(&raw.name),
            serial: raw.serial,
            version: fixed_str(&raw.version),
        }
    }
}

// =============================================================================
// Library functions
// =============================================================================

#[link(name = "zet017tcp")]
extern "system" {
    fn zet017_server_create(server: *mut *mut RawServer) -> c_int;
    fn zet017_server_free(server: *mut *mut RawServer) -> c_int;
    fn zet017_server_add_device(server: *mut RawServer, ip: *const c_char) -> c_int;
    fn zet017_server_remove_device(server: *mut RawServer, ip: *const c_char) -> c_int;
    fn zet017_device_get_info(server: *mut RawServer, number: u32, info: *mut RawInfo) -> c_int;
    fn zet017_device_get_state(server: *mut RawServer, number: u32, state: *mut RawState)
        -> c_int;
    fn zet017_device_get_config(
        server: *mut RawServer,
        number: u32,
        config: *mut RawConfig,
    ) -> c_int;
    fn zet017_device_set_config(
        server: *mut RawServer,
        number: u32,
        config: *mut RawConfig,
    ) -> c_int;
    fn zet017_device_start(server: *mut RawServer, number: u32, dac: u32) -> c_int;
    fn zet017_device_stop(server: *mut RawServer, number: u32) -> c_int;
    fn zet017_channel_get_data(
        server: *mut RawServer,
        number: u32,
        channel: u32,
        pointer: u32,
        data: *mut f32,
        size: u32,
    ) -> c_int;
    fn zet017_channel_put_data(
        server: *mut RawServer,
        number: u32,
        channel: u32,
        pointer: u32,
        data: *mut f32,
        size: u32,
    ) -> c_int;
}

fn check(op: &'static str, code: c_int) -> DeviceResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(DeviceError::Status { op, code })
    }
}

/// Status codes shared by the channel transfer calls.
fn check_transfer(op: &'static str, code: c_int, number: u32, channel: u32) -> DeviceResult<()> {
    match code {
        0 => Ok(()),
        -1 => Err(DeviceError::UnknownDevice(number)),
        -2 | -5 => Err(DeviceError::InvalidChannel { channel }),
        -3 => Err(DeviceError::NotConnected),
        code => Err(DeviceError::Status { op, code }),
    }
}

fn c_ip(ip: &str) -> DeviceResult<CString> {
    CString::new(ip).map_err(|_| DeviceError::msg(format!("invalid IP address {:?}", ip)))
}

fn transfer_len(len: usize) -> DeviceResult<u32> {
    u32::try_from(len).map_err(|_| DeviceError::msg(format!("transfer of {} samples", len)))
}

// =============================================================================
// Session
// =============================================================================

/// Session on the vendor TCP library.
pub struct NativeSession {
    server: *mut RawServer,
    devices: Vec<String>,
}

// SAFETY: the library serialises access to the server internally, and the
// handle is only ever used from the thread that owns the session.
unsafe impl Send for NativeSession {}

impl NativeSession {
    /// Create a library session. Failure is a fatal connection error.
    pub fn create() -> Result<Self> {
        let mut server = ptr::null_mut();
        // SAFETY: `server` is a valid out-pointer for the duration of the call.
        let code = unsafe { zet017_server_create(&mut server) };
        check("zet017_server_create", code)
            .map_err(|e| Error::connection("create session", e))?;
        if server.is_null() {
            return Err(Error::connection(
                "create session",
                DeviceError::Library("null server handle".into()),
            ));
        }
        Ok(Self {
            server,
            devices: Vec::new(),
        })
    }

    fn server(&self) -> DeviceResult<*mut RawServer> {
        if self.server.is_null() {
            Err(DeviceError::Library("session closed".into()))
        } else {
            Ok(self.server)
        }
    }
}

impl DeviceSession for NativeSession {
    fn transport(&self) -> &str {
        "zet017tcp"
    }

    fn add_device(&mut self, ip: &str) -> DeviceResult<u32> {
        let server = self.server()?;
        let c_ip = c_ip(ip)?;
        // SAFETY: `server` is live and `c_ip` is NUL-terminated; the library copies it.
        let code = unsafe { zet017_server_add_device(server, c_ip.as_ptr()) };
        check("zet017_server_add_device", code)?;

        self.devices.push(ip.to_string());
        let number = (self.devices.len() - 1) as u32;
        debug!("zet017tcp: {} is slot {}", ip, number);
        Ok(number)
    }

    fn remove_device(&mut self, ip: &str) -> DeviceResult<()> {
        let server = self.server()?;
        let c_ip = c_ip(ip)?;
        // SAFETY: as in `add_device`.
        let code = unsafe { zet017_server_remove_device(server, c_ip.as_ptr()) };
        check("zet017_server_remove_device", code)?;
        self.devices.retain(|d| d != ip);
        Ok(())
    }

    fn state(&mut self, device: u32) -> DeviceResult<DeviceState> {
        let server = self.server()?;
        let mut raw = RawState::default();
        // SAFETY: `raw` is a properly laid out, writable state struct.
        let code = unsafe { zet017_device_get_state(server, device, &mut raw) };
        match code {
            0 => Ok(raw.into()),
            -2 => Err(DeviceError::UnknownDevice(device)),
            code => Err(DeviceError::Status {
                op: "zet017_device_get_state",
                code,
            }),
        }
    }

    fn info(&mut self, device: u32) -> DeviceResult<DeviceInfo> {
        let server = self.server()?;
        let mut raw = RawInfo {
            ip: [0; 16],
            name: [0; 16],
            serial: 0,
            version: [0; 32],
        };
        // SAFETY: `raw` is a properly laid out, writable info struct.
        let code = unsafe { zet017_device_get_info(server, device, &mut raw) };
        check("zet017_device_get_info", code)?;
        Ok(raw.into())
    }

    fn config(&mut self, device: u32) -> DeviceResult<DeviceConfig> {
        let server = self.server()?;
        let mut raw = RawConfig::default();
        // SAFETY: `raw` is a properly laid out, writable config struct.
        let code = unsafe { zet017_device_get_config(server, device, &mut raw) };
        check("zet017_device_get_config", code)?;
        Ok(raw.into())
    }

    fn set_config(&mut self, device: u32, config: &DeviceConfig) -> DeviceResult<()> {
        let server = self.server()?;
        let mut raw = RawConfig::from(config);
        // SAFETY: the library only reads through the config pointer.
        let code = unsafe { zet017_device_set_config(server, device, &mut raw) };
        check("zet017_device_set_config", code)
    }

    fn start(&mut self, device: u32, enable_output: bool) -> DeviceResult<()> {
        let server = self.server()?;
        // SAFETY: plain values only.
        let code = unsafe { zet017_device_start(server, device, enable_output as u32) };
        match code {
            0 => Ok(()),
            -1 => Err(DeviceError::UnknownDevice(device)),
            -2 => Err(DeviceError::NotConnected),
            code => Err(DeviceError::Status {
                op: "zet017_device_start",
                code,
            }),
        }
    }

    fn stop(&mut self, device: u32) -> DeviceResult<()> {
        let server = self.server()?;
        // SAFETY: plain values only.
        let code = unsafe { zet017_device_stop(server, device) };
        check("zet017_device_stop", code)
    }

    fn read_channel(
        &mut self,
        device: u32,
        channel: u32,
        pointer: u32,
        data: &mut [f32],
    ) -> DeviceResult<()> {
        let server = self.server()?;
        let size = transfer_len(data.len())?;
        // SAFETY: `data` is valid for `size` writes for the duration of the call.
        let code = unsafe {
            zet017_channel_get_data(server, device, channel, pointer, data.as_mut_ptr(), size)
        };
        check_transfer("zet017_channel_get_data", code, device, channel)
    }

    fn write_channel(
        &mut self,
        device: u32,
        channel: u32,
        pointer: u32,
        data: &[f32],
    ) -> DeviceResult<()> {
        let server = self.server()?;
        let size = transfer_len(data.len())?;
        // SAFETY: the library only reads `size` samples from `data`; the
        // pointer is declared mutable by the C API but never written through.
        let code = unsafe {
            zet017_channel_put_data(
                server,
                device,
                channel,
                pointer,
                data.as_ptr() as *mut f32,
                size,
            )
        };
        check_transfer("zet017_channel_put_data", code, device, channel)
    }

    fn close(&mut self) -> DeviceResult<()> {
        if self.server.is_null() {
            return Ok(());
        }
        // SAFETY: `server` came from `zet017_server_create` and is freed once;
        // the library nulls it through the out-pointer.
        let code = unsafe { zet017_server_free(&mut self.server) };
        self.server = ptr::null_mut();
        self.devices.clear();
        check("zet017_server_free", code)
    }
}

impl Drop for NativeSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
