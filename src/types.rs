//! Device, configuration and session types.
//!
//! Provides the snapshot types reported by a device transport
//! ([`DeviceState`], [`DeviceInfo`], [`DeviceConfig`]) and the host-side
//! configuration and bookkeeping types ([`PortionSpec`], [`SyncConfig`],
//! [`SessionState`]).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Number of ADC input channels on the device.
pub const ADC_CHANNELS: u32 = 8;

/// Number of DAC output channels on the device.
pub const DAC_CHANNELS: u32 = 2;

/// ADC sample rates the device can be switched to.
pub const SUPPORTED_ADC_RATES: [u32; 4] = [2_500, 5_000, 25_000, 50_000];

/// Per-channel ADC gains the device supports.
pub const SUPPORTED_GAINS: [u32; 3] = [1, 10, 100];

/// The DAC rate is derived from this clock by an integer divider.
pub const DAC_CLOCK_HZ: u32 = 80_000_000;

/// Highest DAC sample rate.
pub const MAX_DAC_RATE: u32 = 200_000;

// =============================================================================
// Device snapshots
// =============================================================================

/// Circular-buffer state reported by the device once per tick.
///
/// Never mutated by the synchronisation core, only compared against the
/// previous snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceState {
    /// Whether the transport currently has a live connection to the device.
    pub connected: bool,
    /// Incremented by the transport every time the connection is re-established.
    pub reconnect_count: u64,
    /// Device write position in the ADC ring, in samples per channel.
    pub adc_write_pointer: u32,
    /// ADC ring size, in samples per channel.
    pub adc_buffer_capacity: u32,
    /// Device playback position in the DAC ring, in samples per channel.
    pub dac_read_pointer: u32,
    /// DAC ring size, in samples per channel.
    pub dac_buffer_capacity: u32,
}

/// Identity of a connected device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    pub ip: String,
    pub name: String,
    pub serial: u32,
    pub version: String,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} s/n {}", self.ip, self.name, self.serial)
    }
}

// =============================================================================
// Device configuration
// =============================================================================

/// Acquisition and playback configuration pushed to the device on every fresh connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceConfig {
    /// ADC sample rate in Hz (one of [`SUPPORTED_ADC_RATES`]).
    pub sample_rate_adc: u32,
    /// DAC sample rate in Hz.
    pub sample_rate_dac: u32,
    /// Bit mask of enabled ADC channels.
    pub mask_channel_adc: u32,
    /// Bit mask of ADC channels with ICP (IEPE) excitation enabled.
    pub mask_icp: u32,
    /// Per-channel gain (one of [`SUPPORTED_GAINS`]).
    pub gain: [u32; 8],
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate_adc: 25_000,
            sample_rate_dac: 50_000,
            mask_channel_adc: 0x01,
            mask_icp: 0x00,
            gain: [1; 8],
        }
    }
}

impl DeviceConfig {
    /// Create a configuration with the given ADC and DAC sample rates.
    pub fn new(sample_rate_adc: u32, sample_rate_dac: u32) -> Self {
        Self {
            sample_rate_adc,
            sample_rate_dac,
            ..Default::default()
        }
    }

    /// Set the enabled ADC channel mask (builder pattern).
    pub fn with_channel_mask(mut self, mask: u32) -> Self {
        self.mask_channel_adc = mask;
        self
    }

    /// Set the ICP channel mask (builder pattern).
    pub fn with_icp_mask(mut self, mask: u32) -> Self {
        self.mask_icp = mask;
        self
    }

    /// Set the full gain table (builder pattern).
    pub fn with_gains(mut self, gain: [u32; 8]) -> Self {
        self.gain = gain;
        self
    }

    /// Set the gain of a single channel (builder pattern).
    pub fn with_gain(mut self, channel: usize, gain: u32) -> Self {
        if let Some(slot) = self.gain.get_mut(channel) {
            *slot = gain;
        }
        self
    }

    /// Whether an ADC channel is enabled in the channel mask.
    pub fn is_channel_enabled(&self, channel: u32) -> bool {
        channel < ADC_CHANNELS && self.mask_channel_adc & (1 << channel) != 0
    }

    /// Check the configuration against what the device hardware accepts.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_ADC_RATES.contains(&self.sample_rate_adc) {
            return Err(Error::invalid_config(format!(
                "ADC sample rate {} is not one of {:?}",
                self.sample_rate_adc, SUPPORTED_ADC_RATES
            )));
        }

        let rate = self.sample_rate_dac;
        let divider = if rate == 0 { 0 } else { DAC_CLOCK_HZ / rate };
        if rate == 0 || rate > MAX_DAC_RATE || DAC_CLOCK_HZ % rate != 0 || divider > u16::MAX as u32
        {
            return Err(Error::invalid_config(format!(
                "DAC sample rate {} must divide {} Hz and be at most {}",
                rate, DAC_CLOCK_HZ, MAX_DAC_RATE
            )));
        }

        let channel_bits = (1u32 << ADC_CHANNELS) - 1;
        if self.mask_channel_adc == 0 || self.mask_channel_adc & !channel_bits != 0 {
            return Err(Error::invalid_config(format!(
                "ADC channel mask 0x{:02x} must select at least one of {} channels",
                self.mask_channel_adc, ADC_CHANNELS
            )));
        }
        if self.mask_icp & !self.mask_channel_adc != 0 {
            return Err(Error::invalid_config(format!(
                "ICP mask 0x{:02x} enables channels outside channel mask 0x{:02x}",
                self.mask_icp, self.mask_channel_adc
            )));
        }

        if let Some((channel, gain)) = self
            .gain
            .iter()
            .enumerate()
            .find(|(_, g)| !SUPPORTED_GAINS.contains(g))
        {
            return Err(Error::invalid_config(format!(
                "gain {} on channel {} is not one of {:?}",
                gain, channel, SUPPORTED_GAINS
            )));
        }

        Ok(())
    }
}

// =============================================================================
// Portion sizing
// =============================================================================

/// Fixed batch sizes used by the pacers, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PortionSpec {
    /// Samples consumed per ADC read.
    pub adc_portion: u32,
    /// Samples produced per DAC write.
    pub dac_portion: u32,
    /// Headroom kept ahead of the DAC playback pointer beyond one portion.
    pub dac_lookahead: u32,
    /// Initial distance of the local DAC pointer ahead of a fresh device pointer.
    pub dac_start_offset: u32,
    /// Upper bound on ADC portions read in a single tick.
    pub max_adc_portions_per_tick: u32,
}

impl PortionSpec {
    /// Create a portion spec. The DAC start offset defaults to one DAC portion.
    pub fn new(adc_portion: u32, dac_portion: u32, dac_lookahead: u32) -> Self {
        Self {
            adc_portion,
            dac_portion,
            dac_lookahead,
            dac_start_offset: dac_portion,
            max_adc_portions_per_tick: 1,
        }
    }

    /// Derive portions from sample rates so that one portion covers one tick.
    ///
    /// The lookahead is half a second of output and the DAC start offset is one
    /// second plus one portion.
    pub fn for_rates(sample_rate_adc: u32, sample_rate_dac: u32, tick: Duration) -> Self {
        let per_tick = |rate: u32| ((rate as f64 * tick.as_secs_f64()).round() as u32).max(1);
        let dac_portion = per_tick(sample_rate_dac);
        Self::new(per_tick(sample_rate_adc), dac_portion, sample_rate_dac / 2)
            .with_dac_start_offset(sample_rate_dac + dac_portion)
    }

    /// Set the initial DAC pointer offset (builder pattern).
    pub fn with_dac_start_offset(mut self, offset: u32) -> Self {
        self.dac_start_offset = offset;
        self
    }

    /// Allow draining up to `n` whole ADC portions per tick (builder pattern).
    ///
    /// Default: 1. Production faster than one portion per tick accumulates in
    /// the device ring until it is overwritten.
    pub fn with_max_adc_portions_per_tick(mut self, n: u32) -> Self {
        self.max_adc_portions_per_tick = n;
        self
    }

    /// Margin the playback pacer maintains ahead of the device.
    pub fn dac_target_margin(&self) -> u64 {
        self.dac_portion as u64 + self.dac_lookahead as u64
    }

    /// Upper bound on DAC writes needed to restore the target margin.
    pub fn max_dac_writes_per_tick(&self) -> u32 {
        if self.dac_portion == 0 {
            return 0;
        }
        self.dac_lookahead.div_ceil(self.dac_portion) + 1
    }

    /// Reject sizes that can never make progress.
    pub fn validate(&self) -> Result<()> {
        if self.adc_portion == 0 {
            return Err(Error::invalid_config("ADC portion cannot be 0"));
        }
        if self.dac_portion == 0 {
            return Err(Error::invalid_config("DAC portion cannot be 0"));
        }
        if self.max_adc_portions_per_tick == 0 {
            return Err(Error::invalid_config(
                "max ADC portions per tick cannot be 0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Synchronisation config
// =============================================================================

/// Complete configuration of a polling session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SyncConfig {
    /// Polling period (default: 100ms).
    #[cfg_attr(feature = "serde", serde(with = "duration_millis"))]
    pub tick_interval: Duration,
    /// ADC channel read by the acquisition pacer.
    pub adc_channel: u32,
    /// DAC channel written by the playback pacer. `None` disables output.
    pub dac_channel: Option<u32>,
    /// Portion sizes.
    pub portions: PortionSpec,
    /// Configuration pushed to the device.
    pub device: DeviceConfig,
}

#[cfg(feature = "serde")]
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis().min(u64::MAX as u128) as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl SyncConfig {
    /// Default polling period.
    pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

    /// Create a configuration for the given device settings.
    ///
    /// Portions default to one tick's worth of samples, reading ADC channel 0
    /// with output disabled.
    pub fn new(device: DeviceConfig) -> Self {
        let portions = PortionSpec::for_rates(
            device.sample_rate_adc,
            device.sample_rate_dac,
            Self::DEFAULT_TICK,
        );
        Self {
            tick_interval: Self::DEFAULT_TICK,
            adc_channel: 0,
            dac_channel: None,
            portions,
            device,
        }
    }

    /// Set the polling period (builder pattern).
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the ADC channel to read (builder pattern).
    pub fn with_adc_channel(mut self, channel: u32) -> Self {
        self.adc_channel = channel;
        self
    }

    /// Enable output on the given DAC channel (builder pattern).
    pub fn with_dac_channel(mut self, channel: u32) -> Self {
        self.dac_channel = Some(channel);
        self
    }

    /// Set the portion sizes (builder pattern).
    pub fn with_portions(mut self, portions: PortionSpec) -> Self {
        self.portions = portions;
        self
    }

    /// Whether the device should be started with DAC output enabled.
    pub fn output_enabled(&self) -> bool {
        self.dac_channel.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(Error::invalid_config("tick interval cannot be 0"));
        }
        self.device.validate()?;
        self.portions.validate()?;

        if !self.device.is_channel_enabled(self.adc_channel) {
            return Err(Error::invalid_config(format!(
                "ADC channel {} is not enabled in channel mask 0x{:02x}",
                self.adc_channel, self.device.mask_channel_adc
            )));
        }
        if let Some(channel) = self.dac_channel {
            if channel >= DAC_CHANNELS {
                return Err(Error::invalid_config(format!(
                    "DAC channel {} out of range (device has {})",
                    channel, DAC_CHANNELS
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Session bookkeeping
// =============================================================================

/// Connection state of the device slot, as seen by the lifecycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LinkState {
    #[default]
    Disconnected,
    /// Connected, configuration or start not yet accepted.
    Unconfigured,
    /// Connected, configured and started.
    Configured,
}

/// Host-side stream state that persists across ticks.
///
/// Local pointers are only meaningful for the device session they were
/// established in; they are reset whenever a reconnection is observed.
/// The output generator keeps its own phase; it is reset through
/// [`SampleSource::reset`](crate::SampleSource::reset) on the same transitions.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SessionState {
    pub configured: bool,
    /// ADC portions consumed in this session.
    pub sample_counter: u64,
    /// End of the last ADC portion consumed.
    pub local_adc_pointer: u32,
    /// End of the last DAC portion written.
    pub local_dac_pointer: u32,
    pub previous_connected: bool,
    pub previous_reconnect_count: u64,
    /// Identity fetched on the most recent connect transition.
    pub identity: Option<DeviceInfo>,
}

impl SessionState {
    pub fn new(portions: &PortionSpec) -> Self {
        Self {
            local_dac_pointer: portions.dac_start_offset,
            ..Default::default()
        }
    }

    /// Return pointers and counters to their initial values in place.
    pub fn reset(&mut self, portions: &PortionSpec) {
        self.configured = false;
        self.sample_counter = 0;
        self.local_adc_pointer = 0;
        self.local_dac_pointer = portions.dac_start_offset;
        self.identity = None;
    }

    /// Log prefix naming the device, falling back to a placeholder before identification.
    pub fn label(&self) -> String {
        match &self.identity {
            Some(info) => info.to_string(),
            None => "<unidentified device>".to_string(),
        }
    }
}

// =============================================================================
// Run results
// =============================================================================

/// Why a polling run returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// Cancellation was requested.
    Stopped,
}

/// Counters accumulated over a polling run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StreamStats {
    pub ticks: u64,
    /// Ticks skipped because a previous tick overran its budget.
    pub missed_ticks: u64,
    pub adc_portions_read: u64,
    pub dac_portions_written: u64,
    pub read_errors: u64,
    pub write_errors: u64,
    pub state_errors: u64,
    pub configure_errors: u64,
    /// Connect and reconnect transitions observed.
    pub connects: u64,
    pub disconnects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_device_config_is_valid() {
        assert!(DeviceConfig::default().validate().is_ok());
        assert!(DeviceConfig::new(50_000, 200_000).validate().is_ok());
    }

    #[test]
    fn device_config_rejects_unsupported_values() {
        assert!(DeviceConfig::new(10_000, 50_000).validate().is_err());
        assert!(DeviceConfig::new(25_000, 0).validate().is_err());
        assert!(DeviceConfig::new(25_000, 300_000).validate().is_err());
        // 80 MHz / 30 kHz is not an integer divider
        assert!(DeviceConfig::new(25_000, 30_000).validate().is_err());
        assert!(DeviceConfig::default()
            .with_gain(3, 50)
            .validate()
            .is_err());
        assert!(DeviceConfig::default()
            .with_channel_mask(0)
            .validate()
            .is_err());
        assert!(DeviceConfig::default()
            .with_channel_mask(0x1ff)
            .validate()
            .is_err());
        assert!(DeviceConfig::default()
            .with_channel_mask(0x0e)
            .with_icp_mask(0x01)
            .validate()
            .is_err());
    }

    #[test]
    fn with_gain_ignores_out_of_range_channel() {
        let cfg = DeviceConfig::default().with_gain(3, 100).with_gain(12, 10);
        assert_eq!(cfg.gain, [1, 1, 1, 100, 1, 1, 1, 1]);
    }

    #[test]
    fn portions_for_rates_cover_one_tick() {
        let spec = PortionSpec::for_rates(25_000, 50_000, Duration::from_millis(100));
        assert_eq!(spec.adc_portion, 2_500);
        assert_eq!(spec.dac_portion, 5_000);
        assert_eq!(spec.dac_lookahead, 25_000);
        assert_eq!(spec.dac_start_offset, 55_000);
        assert_eq!(spec.max_adc_portions_per_tick, 1);
    }

    #[test]
    fn max_dac_writes_bound() {
        assert_eq!(PortionSpec::new(1, 5_000, 25_000).max_dac_writes_per_tick(), 6);
        assert_eq!(PortionSpec::new(1, 4_000, 25_000).max_dac_writes_per_tick(), 8);
        assert_eq!(PortionSpec::new(1, 100, 0).max_dac_writes_per_tick(), 1);
    }

    #[test]
    fn portion_spec_validation() {
        assert!(PortionSpec::new(0, 10, 10).validate().is_err());
        assert!(PortionSpec::new(10, 0, 10).validate().is_err());
        assert!(PortionSpec::new(10, 10, 0)
            .with_max_adc_portions_per_tick(0)
            .validate()
            .is_err());
        assert!(PortionSpec::new(10, 10, 0).validate().is_ok());
    }

    #[test]
    fn sync_config_requires_enabled_adc_channel() {
        let device = DeviceConfig::default().with_channel_mask(0x0e);
        assert!(SyncConfig::new(device.clone()).validate().is_err());
        assert!(SyncConfig::new(device.clone())
            .with_adc_channel(3)
            .validate()
            .is_ok());
        assert!(SyncConfig::new(device.clone())
            .with_adc_channel(3)
            .with_dac_channel(2)
            .validate()
            .is_err());
        assert!(SyncConfig::new(device)
            .with_adc_channel(3)
            .with_tick_interval(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn session_state_reset_restores_initial_pointers() {
        let spec = PortionSpec::new(100, 10, 30).with_dac_start_offset(55);
        let mut state = SessionState::new(&spec);
        assert_eq!(state.local_dac_pointer, 55);

        state.configured = true;
        state.sample_counter = 7;
        state.local_adc_pointer = 400;
        state.local_dac_pointer = 3;
        state.identity = Some(DeviceInfo::default());
        state.previous_connected = true;
        state.previous_reconnect_count = 4;

        state.reset(&spec);
        assert!(!state.configured);
        assert_eq!(state.sample_counter, 0);
        assert_eq!(state.local_adc_pointer, 0);
        assert_eq!(state.local_dac_pointer, 55);
        assert!(state.identity.is_none());
        // Transition tracking is owned by the controller, not reset here.
        assert!(state.previous_connected);
        assert_eq!(state.previous_reconnect_count, 4);
    }

    #[test]
    fn device_info_display() {
        let info = DeviceInfo {
            ip: "192.168.1.100".into(),
            name: "ZET017".into(),
            serial: 1234,
            version: "1.0".into(),
        };
        assert_eq!(info.to_string(), "192.168.1.100: ZET017 s/n 1234");
    }
}
