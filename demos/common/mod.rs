//! Shared code for demos.

use clap::Parser;
use zet017_mock::{MockConfig, MockDevice};
use zet017_stream::{Device, Result};

#[derive(Parser)]
#[command(about = "Stream ADC input and DAC output with a ZET 017")]
pub struct Args {
    /// Device IP address
    #[arg(default_value = "192.168.1.100")]
    pub ip: String,

    /// Use an in-process simulated device instead of the vendor library
    #[arg(long)]
    pub simulate: bool,

    /// ADC sample rate in Hz (2500, 5000, 25000 or 50000)
    #[arg(long, default_value_t = 50_000)]
    pub adc_rate: u32,

    /// DAC sample rate in Hz
    #[arg(long, default_value_t = 50_000)]
    pub dac_rate: u32,

    /// ADC channel to read
    #[arg(short, long, default_value_t = 3)]
    pub channel: u32,

    /// Gain of the ADC channel (1, 10 or 100)
    #[arg(short, long, default_value_t = 100)]
    pub gain: u32,

    /// Enable ICP excitation on the ADC channel
    #[arg(long)]
    pub icp: bool,

    /// DAC channel to write
    #[arg(long, default_value_t = 0)]
    pub dac_channel: u32,

    /// Acquire only, leave the DAC stopped
    #[arg(long)]
    pub no_output: bool,

    /// Polling period in milliseconds
    #[arg(long, default_value_t = 100)]
    pub tick_ms: u64,
}

/// Register the device on the vendor library, or on a simulated device with `--simulate`.
pub fn open(args: &Args) -> Result<Device> {
    if args.simulate {
        let mock = MockDevice::new(MockConfig::new().realtime().connected());
        return Device::connect(mock, &args.ip);
    }
    open_native(&args.ip)
}

#[cfg(feature = "native")]
fn open_native(ip: &str) -> Result<Device> {
    zet017_stream::open_device(ip)
}

#[cfg(not(feature = "native"))]
fn open_native(_ip: &str) -> Result<Device> {
    Err(zet017_stream::Error::invalid_config(
        "built without the `native` feature, run with --simulate",
    ))
}
