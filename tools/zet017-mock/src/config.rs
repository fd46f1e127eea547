//! Configuration types for the mock device.

use zet017_stream::DeviceInfo;

/// Values the mock produces on its ADC channels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AdcPattern {
    /// Each sample holds its absolute index since the device session began.
    Ramp,
    /// Every sample holds the same value.
    Constant(f32),
}

/// Configuration for a [`MockDevice`](crate::MockDevice).
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub name: String,
    pub serial: u32,
    pub version: String,
    /// ADC ring size in samples per channel.
    pub adc_capacity: u32,
    /// DAC ring size in samples per channel.
    pub dac_capacity: u32,
    pub adc_pattern: AdcPattern,
    /// Advance the ring pointers with wall-clock time while started.
    pub realtime: bool,
    /// Report the device as connected as soon as it is added.
    pub connect_on_add: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "ZET017".to_string(),
            serial: 17,
            version: "mock".to_string(),
            adc_capacity: 125_000,
            dac_capacity: 200_000,
            adc_pattern: AdcPattern::Ramp,
            realtime: false,
            connect_on_add: false,
        }
    }
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the ring sizes.
    pub fn with_capacities(mut self, adc: u32, dac: u32) -> Self {
        self.adc_capacity = adc;
        self.dac_capacity = dac;
        self
    }

    pub fn with_pattern(mut self, pattern: AdcPattern) -> Self {
        self.adc_pattern = pattern;
        self
    }

    pub fn with_serial(mut self, serial: u32) -> Self {
        self.serial = serial;
        self
    }

    /// Advance pointers at the configured sample rates while started.
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Connect immediately when the device is added.
    pub fn connected(mut self) -> Self {
        self.connect_on_add = true;
        self
    }

    pub(crate) fn info(&self, ip: &str) -> DeviceInfo {
        DeviceInfo {
            ip: ip.to_string(),
            name: self.name.clone(),
            serial: self.serial,
            version: self.version.clone(),
        }
    }
}
