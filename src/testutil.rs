//! Scripted device transport for unit tests.

use std::sync::{Arc, Mutex};

use crate::backend::DeviceSession;
use crate::error::{DeviceError, DeviceResult};
use crate::types::{DeviceConfig, DeviceInfo, DeviceState};

/// Recorded calls and canned responses for a [`TestSession`].
#[derive(Default)]
pub struct Script {
    pub state: DeviceState,
    pub info: DeviceInfo,
    pub config: DeviceConfig,

    pub fail_add: bool,
    pub fail_state: Option<DeviceError>,
    pub fail_info: bool,
    pub fail_set_config: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    /// Fail every read/write whose call index (0-based) is in the list.
    pub fail_reads: Vec<usize>,
    pub fail_writes: Vec<usize>,

    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub set_configs: Vec<DeviceConfig>,
    pub starts: Vec<bool>,
    pub stop_calls: usize,
    pub close_calls: usize,
    pub read_calls: usize,
    pub write_calls: usize,
    /// (channel, pointer, count) of successful reads.
    pub reads: Vec<(u32, u32, usize)>,
    /// (channel, pointer, samples) of successful writes.
    pub writes: Vec<(u32, u32, Vec<f32>)>,
}

pub struct TestSession {
    script: Arc<Mutex<Script>>,
}

impl TestSession {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                info: DeviceInfo {
                    ip: "10.0.0.7".into(),
                    name: "ZET017".into(),
                    serial: 42,
                    version: "test".into(),
                },
                ..Default::default()
            })),
        }
    }

    pub fn script(&self) -> Arc<Mutex<Script>> {
        Arc::clone(&self.script)
    }
}

impl DeviceSession for TestSession {
    fn transport(&self) -> &str {
        "test"
    }

    fn add_device(&mut self, ip: &str) -> DeviceResult<u32> {
        let mut s = self.script.lock().unwrap();
        if s.fail_add {
            return Err(DeviceError::msg("add refused"));
        }
        s.added.push(ip.to_string());
        Ok(s.added.len() as u32 - 1)
    }

    fn remove_device(&mut self, ip: &str) -> DeviceResult<()> {
        self.script.lock().unwrap().removed.push(ip.to_string());
        Ok(())
    }

    fn state(&mut self, _device: u32) -> DeviceResult<DeviceState> {
        let s = self.script.lock().unwrap();
        match &s.fail_state {
            Some(e) => Err(e.clone()),
            None => Ok(s.state),
        }
    }

    fn info(&mut self, _device: u32) -> DeviceResult<DeviceInfo> {
        let s = self.script.lock().unwrap();
        if s.fail_info {
            return Err(DeviceError::NotConnected);
        }
        Ok(s.info.clone())
    }

    fn config(&mut self, _device: u32) -> DeviceResult<DeviceConfig> {
        Ok(self.script.lock().unwrap().config.clone())
    }

    fn set_config(&mut self, _device: u32, config: &DeviceConfig) -> DeviceResult<()> {
        let mut s = self.script.lock().unwrap();
        s.set_configs.push(config.clone());
        if s.fail_set_config {
            return Err(DeviceError::Status {
                op: "set_config",
                code: -2,
            });
        }
        s.config = config.clone();
        Ok(())
    }

    fn start(&mut self, _device: u32, enable_output: bool) -> DeviceResult<()> {
        let mut s = self.script.lock().unwrap();
        s.starts.push(enable_output);
        if s.fail_start {
            return Err(DeviceError::Status {
                op: "start",
                code: -2,
            });
        }
        Ok(())
    }

    fn stop(&mut self, _device: u32) -> DeviceResult<()> {
        let mut s = self.script.lock().unwrap();
        s.stop_calls += 1;
        if s.fail_stop {
            return Err(DeviceError::NotConnected);
        }
        Ok(())
    }

    fn read_channel(
        &mut self,
        _device: u32,
        channel: u32,
        pointer: u32,
        data: &mut [f32],
    ) -> DeviceResult<()> {
        let mut s = self.script.lock().unwrap();
        let call = s.read_calls;
        s.read_calls += 1;
        if s.fail_reads.contains(&call) {
            return Err(DeviceError::NotConnected);
        }
        data.fill(pointer as f32);
        s.reads.push((channel, pointer, data.len()));
        Ok(())
    }

    fn write_channel(
        &mut self,
        _device: u32,
        channel: u32,
        pointer: u32,
        data: &[f32],
    ) -> DeviceResult<()> {
        let mut s = self.script.lock().unwrap();
        let call = s.write_calls;
        s.write_calls += 1;
        if s.fail_writes.contains(&call) {
            return Err(DeviceError::NotConnected);
        }
        s.writes.push((channel, pointer, data.to_vec()));
        Ok(())
    }

    fn close(&mut self) -> DeviceResult<()> {
        self.script.lock().unwrap().close_calls += 1;
        Ok(())
    }
}
