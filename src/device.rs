//! A single device slot on a transport session.

use log::{debug, warn};

use crate::backend::DeviceSession;
use crate::error::{DeviceResult, Error, Result};
use crate::types::{DeviceConfig, DeviceInfo, DeviceState};

/// One logical device, addressed through its transport session.
///
/// The device owns the session: closing or dropping the device removes the
/// slot and releases the session.
///
/// # Example
///
/// ```ignore
/// let session = NativeSession::create()?;
/// let mut device = Device::connect(session, "192.168.1.100")?;
/// let state = device.state()?;
/// println!("connected: {}", state.connected);
/// ```
pub struct Device {
    session: Box<dyn DeviceSession>,
    ip: String,
    number: u32,
    closed: bool,
}

impl Device {
    /// Register `ip` on the session.
    ///
    /// This is the only fatal step of startup: a failure here is returned as
    /// [`Error::Connection`].
    pub fn connect<S: DeviceSession>(session: S, ip: &str) -> Result<Self> {
        let mut session: Box<dyn DeviceSession> = Box::new(session);
        let number = session
            .add_device(ip)
            .map_err(|e| Error::connection(format!("add device {}", ip), e))?;
        debug!(
            "{}: added on {} transport as slot {}",
            ip,
            session.transport(),
            number
        );

        Ok(Self {
            session,
            ip: ip.to_string(),
            number,
            closed: false,
        })
    }

    /// The IP address the device was registered with.
    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Slot number on the session.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Transport name.
    pub fn transport(&self) -> &str {
        self.session.transport()
    }

    pub fn state(&mut self) -> DeviceResult<DeviceState> {
        self.session.state(self.number)
    }

    pub fn info(&mut self) -> DeviceResult<DeviceInfo> {
        self.session.info(self.number)
    }

    pub fn config(&mut self) -> DeviceResult<DeviceConfig> {
        self.session.config(self.number)
    }

    pub fn set_config(&mut self, config: &DeviceConfig) -> DeviceResult<()> {
        self.session.set_config(self.number, config)
    }

    pub fn start(&mut self, enable_output: bool) -> DeviceResult<()> {
        self.session.start(self.number, enable_output)
    }

    pub fn stop(&mut self) -> DeviceResult<()> {
        self.session.stop(self.number)
    }

    /// Fill `data` with ADC samples ending at `pointer`.
    pub fn read_channel(
        &mut self,
        channel: u32,
        pointer: u32,
        data: &mut [f32],
    ) -> DeviceResult<()> {
        self.session.read_channel(self.number, channel, pointer, data)
    }

    /// Write `data` into the DAC ring, ending at `pointer`.
    pub fn write_channel(
        &mut self,
        channel: u32,
        pointer: u32,
        data: &[f32],
    ) -> DeviceResult<()> {
        self.session.write_channel(self.number, channel, pointer, data)
    }

    /// Remove the slot and release the session.
    pub fn close(mut self) -> DeviceResult<()> {
        self.release()
    }

    fn release(&mut self) -> DeviceResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.session.remove_device(&self.ip) {
            warn!("{}: remove device failed: {}", self.ip, e);
        }
        self.session.close()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("{}: session close failed: {}", self.ip, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use crate::testutil::TestSession;

    #[test]
    fn connect_registers_device() {
        let session = TestSession::new();
        let script = session.script();
        let device = Device::connect(session, "10.0.0.7").unwrap();

        assert_eq!(device.ip(), "10.0.0.7");
        assert_eq!(device.number(), 0);
        assert_eq!(device.transport(), "test");
        assert_eq!(script.lock().unwrap().added, vec!["10.0.0.7".to_string()]);
    }

    #[test]
    fn connect_failure_is_fatal() {
        let session = TestSession::new();
        session.script().lock().unwrap().fail_add = true;

        let err = Device::connect(session, "10.0.0.7").err().unwrap();
        assert!(err.is_fatal());
        assert!(matches!(err, Error::Connection { .. }));
    }

    #[test]
    fn close_removes_and_closes_once() {
        let session = TestSession::new();
        let script = session.script();
        let device = Device::connect(session, "10.0.0.7").unwrap();

        device.close().unwrap();

        let script = script.lock().unwrap();
        assert_eq!(script.removed, vec!["10.0.0.7".to_string()]);
        assert_eq!(script.close_calls, 1);
    }

    #[test]
    fn drop_closes_session() {
        let session = TestSession::new();
        let script = session.script();
        {
            let _device = Device::connect(session, "10.0.0.7").unwrap();
        }
        assert_eq!(script.lock().unwrap().close_calls, 1);
    }

    #[test]
    fn calls_are_addressed_to_slot() {
        let session = TestSession::new();
        let script = session.script();
        let mut device = Device::connect(session, "10.0.0.7").unwrap();

        script.lock().unwrap().state.connected = true;
        assert!(device.state().unwrap().connected);

        script.lock().unwrap().fail_state = Some(DeviceError::NotConnected);
        assert_eq!(device.state(), Err(DeviceError::NotConnected));
    }
}
