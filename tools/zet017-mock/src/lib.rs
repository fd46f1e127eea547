//! Mock ZET 017 device for testing and simulation.
//!
//! This crate provides an in-process [`DeviceSession`] that behaves like one
//! ZET 017 on the vendor TCP library: circular ADC and DAC buffers, transfers
//! that end at the requested pointer, a reconnect counter, and the library's
//! range and channel checks. It is used by:
//! - The end-to-end tests of `zet017-stream`
//! - The demos, when run with `--simulate`
//!
//! Pointers move only when the test says so, unless the device is configured
//! as [`realtime`](MockConfig::realtime).
//!
//! # Example
//!
//! ```ignore
//! use zet017_mock::{MockConfig, MockDevice};
//! use zet017_stream::{Device, SyncConfig, SyncStream};
//!
//! let mock = MockDevice::new(MockConfig::new());
//! let handle = mock.handle();
//! let device = Device::connect(mock, "192.168.1.100")?;
//!
//! handle.connect();
//! handle.set_adc_pointer(25_000);
//! ```
//!
//! [`DeviceSession`]: zet017_stream::DeviceSession

mod config;
mod device;
mod handle;

pub use config::{AdcPattern, MockConfig};
pub use device::{MockDevice, Transfer, TRANSFER_LOG_LIMIT};
pub use handle::MockHandle;
