//! Polling driver and its cancellation handle.
//!
//! [`SyncStream`] owns one [`Device`] and polls it at a fixed interval. Each
//! tick queries the device state once, feeds it to the
//! [`SessionController`], and while configured runs the acquisition pacer
//! followed by the playback pacer.
//!
//! # Cancellation
//!
//! [`StreamControl`] is a cloneable stop flag. It is the only state shared
//! with other threads (a Ctrl-C handler, for example). The loop checks it at
//! every tick boundary and while sleeping between ticks; a tick that has
//! started always completes.
//!
//! # Errors
//!
//! Every per-tick failure is logged, counted in [`StreamStats`] and skipped:
//! the next tick retries. Only configuration rejected up front is returned as
//! an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::acquisition::AcquisitionPacer;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::playback::PlaybackPacer;
use crate::sample::{Discard, SampleSink, SampleSource, Silence};
use crate::session::{SessionController, Transition};
use crate::types::{
    DeviceConfig, LinkState, PortionSpec, RunExit, SessionState, StreamStats, SyncConfig,
};

// =============================================================================
// Stream Control
// =============================================================================

/// Thread-safe stop flag for a running [`SyncStream`].
#[derive(Debug, Clone, Default)]
pub struct StreamControl {
    stop_requested: Arc<AtomicBool>,
}

impl StreamControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the polling loop to stop after the current tick.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Check if a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Tick report
// =============================================================================

/// What a single tick did.
#[derive(Debug)]
pub struct TickReport {
    pub transition: Transition,
    /// Link state at the end of the tick.
    pub link: LinkState,
    pub adc_portions: usize,
    pub dac_portions: usize,
    /// Recoverable errors hit during the tick, in order.
    pub errors: Vec<Error>,
}

impl TickReport {
    fn new(link: LinkState) -> Self {
        Self {
            transition: Transition::None,
            link,
            adc_portions: 0,
            dac_portions: 0,
            errors: Vec::new(),
        }
    }
}

// =============================================================================
// Sync Stream
// =============================================================================

/// Fixed-interval synchronisation loop for one device.
///
/// # Example
///
/// ```ignore
/// let device = Device::connect(NativeSession::create()?, "192.168.1.100")?;
/// let config = SyncConfig::new(DeviceConfig::new(25_000, 50_000))
///     .with_adc_channel(0)
///     .with_dac_channel(0);
///
/// let control = StreamControl::new();
/// let mut stream = SyncStream::new(device, config)?
///     .on_portion(MeanReporter::new(""))
///     .with_generator(SineGenerator::new(1.0, 1000.0, 50_000));
///
/// stream.run(&control)?;
/// stream.into_device().close()?;
/// ```
pub struct SyncStream {
    device: Device,
    config: SyncConfig,
    controller: SessionController,
    acquisition: AcquisitionPacer,
    playback: Option<PlaybackPacer>,
    sink: Box<dyn SampleSink>,
    source: Box<dyn SampleSource>,
    stats: StreamStats,
}

impl SyncStream {
    /// Create a stream over `device`. The configuration is validated here.
    pub fn new(device: Device, config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let controller = SessionController::new(
            config.portions,
            config.device.clone(),
            config.output_enabled(),
        );
        let (acquisition, playback) = Self::pacers(&config);

        Ok(Self {
            device,
            config,
            controller,
            acquisition,
            playback,
            sink: Box::new(Discard),
            source: Box::new(Silence),
            stats: StreamStats::default(),
        })
    }

    fn pacers(config: &SyncConfig) -> (AcquisitionPacer, Option<PlaybackPacer>) {
        let portions = &config.portions;
        let acquisition = AcquisitionPacer::new(
            config.adc_channel,
            portions.adc_portion,
            portions.max_adc_portions_per_tick,
        );
        let playback = config
            .dac_channel
            .map(|channel| PlaybackPacer::new(channel, portions));
        (acquisition, playback)
    }

    /// Set the consumer of ADC portions (builder pattern).
    pub fn on_portion<S: SampleSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Set the producer of DAC portions (builder pattern).
    ///
    /// Defaults to silence. Only used when a DAC channel is configured.
    pub fn with_generator<S: SampleSource + 'static>(mut self, source: S) -> Self {
        self.source = Box::new(source);
        self
    }

    /// Replace portion sizes and device configuration.
    ///
    /// A connected device is reconfigured on the next tick, and the local
    /// pointers restart from the device's current ring positions. An invalid
    /// combination is rejected and nothing changes.
    pub fn configure(&mut self, portions: PortionSpec, device: DeviceConfig) -> Result<()> {
        let config = SyncConfig {
            portions,
            device: device.clone(),
            ..self.config.clone()
        };
        config.validate()?;

        self.controller.configure(portions, device);
        let (acquisition, playback) = Self::pacers(&config);
        self.acquisition = acquisition;
        self.playback = playback;
        self.source.reset();
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn session_state(&self) -> &SessionState {
        self.controller.state()
    }

    pub fn link_state(&self) -> LinkState {
        self.controller.link_state()
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Give the device back, for example to close it.
    pub fn into_device(self) -> Device {
        self.device
    }

    /// Run one polling step.
    pub fn tick(&mut self) -> TickReport {
        self.stats.ticks += 1;

        let snapshot = match self.device.state() {
            Ok(snapshot) => snapshot,
            Err(source) => {
                let err = Error::StateQuery(source);
                self.stats.state_errors += 1;
                warn!("{}: {}", self.device.ip(), err);
                let mut report = TickReport::new(self.controller.link_state());
                report.errors.push(err);
                return report;
            }
        };

        let mut report = TickReport::new(LinkState::Disconnected);
        report.transition = self.controller.observe(&mut self.device, &snapshot);
        match report.transition {
            Transition::Connected => {
                self.stats.connects += 1;
                self.source.reset();
            }
            Transition::Disconnected => self.stats.disconnects += 1,
            Transition::None => {}
        }

        if snapshot.connected {
            if let Err(e) = self.controller.ensure_configured(&mut self.device) {
                self.stats.configure_errors += 1;
                warn!("{}: {}", self.controller.state().label(), e);
                report.errors.push(e);
            }
        }

        if self.controller.link_state() == LinkState::Configured {
            match self.acquisition.tick(
                &mut self.device,
                self.controller.state_mut(),
                snapshot.adc_write_pointer,
                snapshot.adc_buffer_capacity,
                self.sink.as_mut(),
            ) {
                Ok(n) => {
                    report.adc_portions = n;
                    self.stats.adc_portions_read += n as u64;
                }
                Err(e) => {
                    self.stats.read_errors += 1;
                    warn!("{}: {}", self.controller.state().label(), e);
                    report.errors.push(e);
                }
            }

            if let Some(playback) = self.playback.as_mut() {
                match playback.tick(
                    &mut self.device,
                    self.controller.state_mut(),
                    snapshot.dac_read_pointer,
                    snapshot.dac_buffer_capacity,
                    self.source.as_mut(),
                ) {
                    Ok(n) => {
                        report.dac_portions = n;
                        self.stats.dac_portions_written += n as u64;
                    }
                    Err(e) => {
                        self.stats.write_errors += 1;
                        warn!("{}: {}", self.controller.state().label(), e);
                        report.errors.push(e);
                    }
                }
            }
        }

        report.link = self.controller.link_state();
        report
    }

    /// Poll until `control` requests a stop.
    ///
    /// Ticks run on a fixed schedule. A tick that overruns its budget does not
    /// cause a burst of catch-up ticks; the missed ones are skipped and
    /// counted. On exit a configured device is stopped (best-effort). The
    /// device itself stays open; close it with [`into_device`](Self::into_device).
    pub fn run(&mut self, control: &StreamControl) -> Result<RunExit> {
        // Maximum sleep slice - controls responsiveness to stop requests
        const SLEEP_SLICE: Duration = Duration::from_millis(5);

        let tick_interval = self.config.tick_interval;
        let mut next_tick = Instant::now();
        info!(
            "{}: polling every {:?} on {} transport",
            self.device.ip(),
            tick_interval,
            self.device.transport()
        );

        'poll: loop {
            if control.is_stop_requested() {
                break;
            }

            // Wait for next tick (sleep_until semantics to avoid drift)
            let now = Instant::now();
            if now < next_tick {
                let mut remaining = next_tick.duration_since(now);
                while remaining > Duration::ZERO {
                    let slice = remaining.min(SLEEP_SLICE);
                    std::thread::sleep(slice);
                    remaining = remaining.saturating_sub(slice);

                    if control.is_stop_requested() {
                        break 'poll;
                    }
                }
            }
            next_tick += tick_interval;

            self.tick();

            // Skip missed ticks rather than running back-to-back
            let now = Instant::now();
            if now > next_tick {
                let missed = now.duration_since(next_tick).as_nanos() / tick_interval.as_nanos();
                let skipped = (missed.min(u32::MAX as u128 - 1) as u32) + 1;
                next_tick += tick_interval * skipped;
                self.stats.missed_ticks += skipped as u64;
                debug!("{}: tick overran, skipped {}", self.device.ip(), skipped);
            }
        }

        if let Err(e) = self.controller.shutdown(&mut self.device) {
            warn!("{}: {}", self.controller.state().label(), e);
        }
        info!(
            "{}: stopped after {} ticks ({} adc portions, {} dac portions)",
            self.device.ip(),
            self.stats.ticks,
            self.stats.adc_portions_read,
            self.stats.dac_portions_written
        );
        Ok(RunExit::Stopped)
    }
}
