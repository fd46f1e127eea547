//! Acquisition and playback demo.
//!
//! Reads one ADC channel in one-second portions and logs the mean of each,
//! while playing a 1011.213 Hz sine on a DAC channel. Survives disconnects:
//! the device is reconfigured whenever it comes back.
//!
//! Run with: `cargo run --example acquire --features native -- 192.168.1.100`
//!
//! Or without hardware: `cargo run --example acquire -- --simulate`

mod common;

use std::time::Duration;

use clap::Parser;
use common::Args;
use log::{error, info};
use zet017_stream::{
    DeviceConfig, MeanReporter, PortionSpec, Result, SineGenerator, StreamControl, SyncConfig,
    SyncStream,
};

const SINE_FREQUENCY: f64 = 1011.213;
const SINE_AMPLITUDE: f64 = 1.0;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let channel_bit = 1u32.checked_shl(args.channel).unwrap_or(0);
    let mut device_config = DeviceConfig::new(args.adc_rate, args.dac_rate)
        .with_channel_mask(channel_bit)
        .with_gain(args.channel as usize, args.gain);
    if args.icp {
        device_config = device_config.with_icp_mask(channel_bit);
    }

    // One second per ADC portion, 100ms per DAC portion with half a second of lookahead.
    let dac_portion = args.dac_rate / 10;
    let portions = PortionSpec::new(args.adc_rate, dac_portion, args.dac_rate / 2)
        .with_dac_start_offset(args.dac_rate + dac_portion);

    let mut config = SyncConfig::new(device_config)
        .with_adc_channel(args.channel)
        .with_portions(portions)
        .with_tick_interval(Duration::from_millis(args.tick_ms));
    if !args.no_output {
        config = config.with_dac_channel(args.dac_channel);
    }

    let device = common::open(&args)?;
    info!("{}: registered on {} transport", device.ip(), device.transport());

    let mut stream = SyncStream::new(device, config)?
        .on_portion(MeanReporter::new(format!("{}: ", args.ip)))
        .with_generator(SineGenerator::new(
            SINE_AMPLITUDE,
            SINE_FREQUENCY,
            args.dac_rate,
        ));

    let control = StreamControl::new();
    let handler_control = control.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_control.stop()) {
        error!("failed to install Ctrl-C handler: {}", e);
    }

    info!("streaming - press Ctrl+C to stop");
    let exit = stream.run(&control)?;

    let stats = stream.stats().clone();
    info!("stream ended: {:?}", exit);
    info!(
        "{} ticks ({} missed), {} adc portions, {} dac portions, {} read / {} write errors, {} connects",
        stats.ticks,
        stats.missed_ticks,
        stats.adc_portions_read,
        stats.dac_portions_written,
        stats.read_errors,
        stats.write_errors,
        stats.connects
    );

    if let Err(e) = stream.into_device().close() {
        error!("close failed: {}", e);
    }
    Ok(())
}
