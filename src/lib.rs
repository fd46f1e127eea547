//! Host-side stream synchronisation for the ZET 017 data acquisition device.
//!
//! The device exposes its ADC input and DAC output as per-channel circular
//! buffers and reports a write/read position in each. This crate polls those
//! positions at a fixed interval and keeps a host-side position of its own,
//! reading whole ADC portions as they fill and writing DAC portions far enough
//! ahead of playback that output never underruns. Connection loss and session
//! renewal are detected from the polled state; the device is reconfigured and
//! all host positions are reset whenever a new device session begins.
//!
//! # Getting Started
//!
//! ```no_run
//! # #[cfg(feature = "native")]
//! # fn main() -> zet017_stream::Result<()> {
//! use zet017_stream::{
//!     open_device, DeviceConfig, MeanReporter, SineGenerator, StreamControl, SyncConfig,
//!     SyncStream,
//! };
//!
//! let device = open_device("192.168.1.100")?;
//! let config = SyncConfig::new(DeviceConfig::new(50_000, 50_000).with_channel_mask(0x0e))
//!     .with_adc_channel(3)
//!     .with_dac_channel(0);
//!
//! let control = StreamControl::new();
//! let mut stream = SyncStream::new(device, config)?
//!     .on_portion(MeanReporter::new(""))
//!     .with_generator(SineGenerator::new(1.0, 1011.213, 50_000));
//!
//! stream.run(&control)?;
//! stream.into_device().close().ok();
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "native"))]
//! # fn main() {}
//! ```
//!
//! # Transports
//!
//! The core only talks to the [`DeviceSession`] trait.
//!
//! - **zet017tcp** - the vendor TCP library (feature: `native`)
//! - **mock** - an in-process simulated device (`tools/zet017-mock`), used by
//!   the end-to-end tests and the demos
//!
//! # Features
//!
//! - `native`: link the vendor library and enable [`open_device`]
//! - `serde`: derive `Serialize`/`Deserialize` for configuration and state types

pub mod acquisition;
pub mod backend;
pub mod device;
mod error;
#[cfg(feature = "native")]
pub mod native;
pub mod playback;
pub mod sample;
pub mod session;
pub mod stream;
#[cfg(test)]
mod testutil;
pub mod tracker;
pub mod types;

// Crate-level error types
pub use error::{ConfigStage, DeviceError, DeviceResult, Error, IoOp, Result};

// Transport trait and device slot
pub use backend::DeviceSession;
pub use device::Device;

// Core types
pub use types::{
    DeviceConfig, DeviceInfo, DeviceState, LinkState, PortionSpec, RunExit, SessionState,
    StreamStats, SyncConfig, ADC_CHANNELS, DAC_CHANNELS, DAC_CLOCK_HZ, MAX_DAC_RATE,
    SUPPORTED_ADC_RATES, SUPPORTED_GAINS,
};

// Pacers, lifecycle and driver
pub use acquisition::AcquisitionPacer;
pub use playback::PlaybackPacer;
pub use session::{SessionController, Transition};
pub use stream::{StreamControl, SyncStream, TickReport};
pub use tracker::available_samples;

// Sample consumers and producers
pub use sample::{
    mean, Discard, MeanReporter, PortionInfo, SampleSink, SampleSource, Silence, SineGenerator,
};

#[cfg(feature = "native")]
pub use native::NativeSession;

/// Open a device on a fresh vendor library session.
///
/// Connection happens in the background; the returned device reports
/// `connected = false` until it is reached.
#[cfg(feature = "native")]
pub fn open_device(ip: &str) -> Result<Device> {
    let session = NativeSession::create()?;
    Device::connect(session, ip)
}
