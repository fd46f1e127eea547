//! Simulated device and its transport session.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::debug;
use zet017_stream::{
    DeviceConfig, DeviceError, DeviceInfo, DeviceResult, DeviceSession, DeviceState, ADC_CHANNELS,
    DAC_CHANNELS,
};

use crate::config::{AdcPattern, MockConfig};
use crate::handle::MockHandle;

/// One recorded channel transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub channel: u32,
    pub pointer: u32,
    pub count: u32,
}

/// Transfers kept per direction. Older entries are dropped so a long
/// realtime simulation does not grow without bound.
pub const TRANSFER_LOG_LIMIT: usize = 4096;

fn record(log: &mut VecDeque<Transfer>, transfer: Transfer) {
    if log.len() == TRANSFER_LOG_LIMIT {
        log.pop_front();
    }
    log.push_back(transfer);
}

/// Failures queued by the test, consumed one per call.
#[derive(Default, Debug)]
pub(crate) struct Faults {
    pub state: u32,
    pub set_config: u32,
    pub start: u32,
    pub read: u32,
    pub write: u32,
}

fn take(counter: &mut u32) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

/// Device state shared between the session and its handles.
#[derive(Debug)]
pub(crate) struct Shared {
    pub config: MockConfig,
    pub ip: Option<String>,
    pub closed: bool,

    pub connected: bool,
    pub reconnect_count: u64,
    pub started: bool,
    pub output_enabled: bool,
    pub device_config: DeviceConfig,

    /// ADC samples produced since the device session began.
    pub adc_total: u64,
    /// DAC samples played since the device session began.
    pub dac_played: u64,
    pub dac_ring: Vec<Vec<f32>>,
    realtime_origin: Option<(Instant, u64, u64)>,

    pub faults: Faults,
    pub reads: VecDeque<Transfer>,
    pub writes: VecDeque<Transfer>,
    pub set_configs: Vec<DeviceConfig>,
    pub starts: Vec<bool>,
    pub stop_calls: usize,
    pub state_calls: usize,
    pub removed: Vec<String>,
}

impl Shared {
    fn new(config: MockConfig) -> Self {
        let dac_ring = vec![vec![0.0; config.dac_capacity as usize]; DAC_CHANNELS as usize];
        Self {
            config,
            ip: None,
            closed: false,
            connected: false,
            reconnect_count: 0,
            started: false,
            output_enabled: false,
            device_config: DeviceConfig::default(),
            adc_total: 0,
            dac_played: 0,
            dac_ring,
            realtime_origin: None,
            faults: Faults::default(),
            reads: VecDeque::new(),
            writes: VecDeque::new(),
            set_configs: Vec::new(),
            starts: Vec::new(),
            stop_calls: 0,
            state_calls: 0,
            removed: Vec::new(),
        }
    }

    pub fn adc_pointer(&self) -> u32 {
        (self.adc_total % self.config.adc_capacity as u64) as u32
    }

    pub fn dac_pointer(&self) -> u32 {
        (self.dac_played % self.config.dac_capacity as u64) as u32
    }

    /// Start a new device session: counter bumps, rings restart, device stops.
    pub fn begin_session(&mut self) {
        self.connected = true;
        self.reconnect_count += 1;
        self.started = false;
        self.output_enabled = false;
        self.adc_total = 0;
        self.dac_played = 0;
        self.realtime_origin = None;
        for ring in &mut self.dac_ring {
            ring.fill(0.0);
        }
        debug!(
            "mock {}: session {} began",
            self.ip.as_deref().unwrap_or("-"),
            self.reconnect_count
        );
    }

    pub fn drop_connection(&mut self) {
        self.connected = false;
        self.started = false;
        self.realtime_origin = None;
    }

    /// Advance both rings by wall-clock time when running in realtime mode.
    fn sync_clock(&mut self) {
        if !self.config.realtime || !self.started {
            return;
        }
        let (origin, adc_base, dac_base) = match self.realtime_origin {
            Some(origin) => origin,
            None => return,
        };
        let elapsed = origin.elapsed().as_secs_f64();
        self.adc_total = adc_base + (elapsed * self.device_config.sample_rate_adc as f64) as u64;
        if self.output_enabled {
            self.dac_played =
                dac_base + (elapsed * self.device_config.sample_rate_dac as f64) as u64;
        }
    }

    fn adc_value(&self, position: u32) -> f32 {
        match self.config.adc_pattern {
            AdcPattern::Constant(value) => value,
            AdcPattern::Ramp => {
                let capacity = self.config.adc_capacity;
                let back = (self.adc_pointer() + capacity - position) % capacity;
                // The write position itself holds the oldest sample in the ring.
                let back = if back == 0 { capacity } else { back };
                self.adc_total
                    .checked_sub(back as u64)
                    .map_or(0.0, |abs| abs as f32)
            }
        }
    }

    fn check_slot(&self, device: u32) -> DeviceResult<()> {
        if self.closed {
            return Err(DeviceError::Library("session closed".into()));
        }
        if device != 0 || self.ip.is_none() {
            return Err(DeviceError::UnknownDevice(device));
        }
        Ok(())
    }

    fn check_connected(&self, device: u32) -> DeviceResult<()> {
        self.check_slot(device)?;
        if !self.connected {
            return Err(DeviceError::NotConnected);
        }
        Ok(())
    }
}

/// Ring positions covered by a transfer of `count` samples ending at `pointer`.
fn ending_at(pointer: u32, count: u32, capacity: u32) -> DeviceResult<impl Iterator<Item = u32>> {
    if pointer >= capacity || count > capacity {
        return Err(DeviceError::OutOfRange {
            pointer,
            count,
            capacity,
        });
    }
    let start = (pointer + capacity - count) % capacity;
    Ok((0..count).map(move |i| (start + i) % capacity))
}

/// A single simulated ZET 017 on its own transport session.
///
/// The device occupies slot 0. Drive it from the test through the
/// [`MockHandle`] returned by [`handle`](Self::handle).
pub struct MockDevice {
    shared: Arc<Mutex<Shared>>,
}

impl MockDevice {
    pub fn new(config: MockConfig) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared::new(config))),
        }
    }

    /// Control and inspection handle sharing this device's state.
    pub fn handle(&self) -> MockHandle {
        MockHandle::new(Arc::clone(&self.shared))
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceSession for MockDevice {
    fn transport(&self) -> &str {
        "mock"
    }

    fn add_device(&mut self, ip: &str) -> DeviceResult<u32> {
        let mut s = self.lock();
        if s.closed {
            return Err(DeviceError::Library("session closed".into()));
        }
        if s.ip.is_some() {
            return Err(DeviceError::Status {
                op: "add_device",
                code: -3,
            });
        }
        s.ip = Some(ip.to_string());
        if s.config.connect_on_add {
            s.begin_session();
        }
        Ok(0)
    }

    fn remove_device(&mut self, ip: &str) -> DeviceResult<()> {
        let mut s = self.lock();
        if s.ip.as_deref() != Some(ip) {
            return Err(DeviceError::msg(format!("{} is not registered", ip)));
        }
        s.ip = None;
        s.drop_connection();
        s.removed.push(ip.to_string());
        Ok(())
    }

    fn state(&mut self, device: u32) -> DeviceResult<DeviceState> {
        let mut s = self.lock();
        s.check_slot(device)?;
        s.state_calls += 1;
        if take(&mut s.faults.state) {
            return Err(DeviceError::Status {
                op: "get_state",
                code: -1,
            });
        }
        s.sync_clock();
        Ok(DeviceState {
            connected: s.connected,
            reconnect_count: s.reconnect_count,
            adc_write_pointer: s.adc_pointer(),
            adc_buffer_capacity: s.config.adc_capacity,
            dac_read_pointer: s.dac_pointer(),
            dac_buffer_capacity: s.config.dac_capacity,
        })
    }

    fn info(&mut self, device: u32) -> DeviceResult<DeviceInfo> {
        let s = self.lock();
        s.check_slot(device)?;
        Ok(s.config.info(s.ip.as_deref().unwrap_or_default()))
    }

    fn config(&mut self, device: u32) -> DeviceResult<DeviceConfig> {
        let s = self.lock();
        s.check_connected(device)?;
        Ok(s.device_config.clone())
    }

    fn set_config(&mut self, device: u32, config: &DeviceConfig) -> DeviceResult<()> {
        let mut s = self.lock();
        s.check_connected(device)?;
        s.set_configs.push(config.clone());
        if take(&mut s.faults.set_config) {
            return Err(DeviceError::Status {
                op: "set_config",
                code: -2,
            });
        }
        s.device_config = config.clone();
        Ok(())
    }

    fn start(&mut self, device: u32, enable_output: bool) -> DeviceResult<()> {
        let mut s = self.lock();
        s.check_connected(device)?;
        s.starts.push(enable_output);
        if take(&mut s.faults.start) {
            return Err(DeviceError::Status {
                op: "start",
                code: -3,
            });
        }
        s.started = true;
        s.output_enabled = enable_output;
        let (adc_total, dac_played) = (s.adc_total, s.dac_played);
        s.realtime_origin = Some((Instant::now(), adc_total, dac_played));
        Ok(())
    }

    fn stop(&mut self, device: u32) -> DeviceResult<()> {
        let mut s = self.lock();
        s.check_slot(device)?;
        s.stop_calls += 1;
        s.check_connected(device)?;
        s.sync_clock();
        s.started = false;
        s.realtime_origin = None;
        Ok(())
    }

    fn read_channel(
        &mut self,
        device: u32,
        channel: u32,
        pointer: u32,
        data: &mut [f32],
    ) -> DeviceResult<()> {
        let mut s = self.lock();
        s.check_connected(device)?;
        if channel >= ADC_CHANNELS || !s.device_config.is_channel_enabled(channel) {
            return Err(DeviceError::InvalidChannel { channel });
        }
        if take(&mut s.faults.read) {
            return Err(DeviceError::Status {
                op: "channel_get_data",
                code: -6,
            });
        }

        let count = data.len() as u32;
        let positions = ending_at(pointer, count, s.config.adc_capacity)?;
        for (slot, position) in data.iter_mut().zip(positions) {
            *slot = s.adc_value(position);
        }
        record(
            &mut s.reads,
            Transfer {
                channel,
                pointer,
                count,
            },
        );
        Ok(())
    }

    fn write_channel(
        &mut self,
        device: u32,
        channel: u32,
        pointer: u32,
        data: &[f32],
    ) -> DeviceResult<()> {
        let mut s = self.lock();
        s.check_connected(device)?;
        if channel >= DAC_CHANNELS {
            return Err(DeviceError::InvalidChannel { channel });
        }
        if take(&mut s.faults.write) {
            return Err(DeviceError::Status {
                op: "channel_put_data",
                code: -6,
            });
        }

        let count = data.len() as u32;
        let positions = ending_at(pointer, count, s.config.dac_capacity)?;
        let ring = &mut s.dac_ring[channel as usize];
        for (sample, position) in data.iter().zip(positions) {
            ring[position as usize] = *sample;
        }
        record(
            &mut s.writes,
            Transfer {
                channel,
                pointer,
                count,
            },
        );
        Ok(())
    }

    fn close(&mut self) -> DeviceResult<()> {
        let mut s = self.lock();
        if !s.closed {
            s.closed = true;
            s.drop_connection();
        }
        Ok(())
    }
}
