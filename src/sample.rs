//! Pluggable sample consumers and producers.
//!
//! The acquisition pacer hands every ADC portion to a [`SampleSink`]; the
//! playback pacer asks a [`SampleSource`] for every DAC portion. Closures
//! implement both traits, so simple cases need no wrapper type:
//!
//! ```ignore
//! let stream = SyncStream::new(device, config)?
//!     .on_portion(|info: &PortionInfo, samples: &[f32]| {
//!         println!("portion {} on channel {}", info.index, info.channel);
//!     })
//!     .with_generator(|buffer: &mut [f32]| buffer.fill(0.5));
//! ```

use std::f64::consts::TAU;

use log::info;

/// Where an ADC portion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortionInfo {
    pub channel: u32,
    /// 1-based index of the portion within the current device session.
    pub index: u64,
    /// Ring position the portion ends at.
    pub pointer: u32,
}

/// Consumer of ADC portions.
pub trait SampleSink: Send {
    fn on_portion(&mut self, info: &PortionInfo, samples: &[f32]);
}

impl<F> SampleSink for F
where
    F: FnMut(&PortionInfo, &[f32]) + Send,
{
    fn on_portion(&mut self, info: &PortionInfo, samples: &[f32]) {
        self(info, samples)
    }
}

/// Producer of DAC portions.
pub trait SampleSource: Send {
    /// Fill `buffer` with the next samples of the output signal.
    fn fill(&mut self, buffer: &mut [f32]);

    /// Restart the signal from its beginning. Called on every new device session.
    fn reset(&mut self) {}
}

impl<F> SampleSource for F
where
    F: FnMut(&mut [f32]) + Send,
{
    fn fill(&mut self, buffer: &mut [f32]) {
        self(buffer)
    }
}

/// Sink that drops every portion.
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl SampleSink for Discard {
    fn on_portion(&mut self, _info: &PortionInfo, _samples: &[f32]) {}
}

/// Source that outputs zeros.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silence;

impl SampleSource for Silence {
    fn fill(&mut self, buffer: &mut [f32]) {
        buffer.fill(0.0);
    }
}

/// Arithmetic mean, 0 for an empty slice.
pub fn mean(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|s| *s as f64).sum();
    (sum / samples.len() as f64) as f32
}

// =============================================================================
// Mean reporter
// =============================================================================

/// Logs the mean of every portion and keeps the latest value.
#[derive(Debug, Default, Clone)]
pub struct MeanReporter {
    label: String,
    last: Option<f32>,
    reported: u64,
}

impl MeanReporter {
    /// Create a reporter whose log lines start with `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Mean of the most recent portion.
    pub fn last_mean(&self) -> Option<f32> {
        self.last
    }

    /// Number of portions seen.
    pub fn reported(&self) -> u64 {
        self.reported
    }
}

impl SampleSink for MeanReporter {
    fn on_portion(&mut self, portion: &PortionInfo, samples: &[f32]) {
        let value = mean(samples);
        self.last = Some(value);
        self.reported += 1;
        info!(
            "{}channel {}: {}: mean value: {:.6} V",
            self.label, portion.channel, portion.index, value
        );
    }
}

// =============================================================================
// Sine generator
// =============================================================================

/// Continuous sine wave at a fixed sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct SineGenerator {
    amplitude: f64,
    phase: f64,
    phase_step: f64,
}

impl SineGenerator {
    pub fn new(amplitude: f64, frequency: f64, sample_rate: u32) -> Self {
        Self {
            amplitude,
            phase: 0.0,
            phase_step: frequency / sample_rate as f64 * TAU,
        }
    }

    /// Current phase in radians, always in `[0, 2π)`.
    pub fn phase(&self) -> f64 {
        self.phase
    }
}

impl SampleSource for SineGenerator {
    fn fill(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = (self.amplitude * self.phase.sin()) as f32;
            self.phase = (self.phase + self.phase_step).rem_euclid(TAU);
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}
