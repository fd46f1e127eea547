//! Device information demo.
//!
//! Waits for the device to connect, then prints its identity, buffer state
//! and current configuration.
//!
//! Run with: `cargo run --example info --features native -- 192.168.1.100`

mod common;

use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use common::Args;
use zet017_stream::Result;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut device = common::open(&args)?;
    println!("Waiting for {}...", device.ip());

    let deadline = Instant::now() + CONNECT_TIMEOUT;
    let state = loop {
        match device.state() {
            Ok(state) if state.connected => break Some(state),
            Ok(_) | Err(_) if Instant::now() >= deadline => break None,
            _ => thread::sleep(Duration::from_millis(100)),
        }
    };

    match state {
        Some(state) => {
            match device.info() {
                Ok(info) => println!("  Device:  {} (version {})", info, info.version),
                Err(e) => println!("  Device:  info unavailable: {}", e),
            }
            println!(
                "  ADC:     pointer {} of {}",
                state.adc_write_pointer, state.adc_buffer_capacity
            );
            println!(
                "  DAC:     pointer {} of {}",
                state.dac_read_pointer, state.dac_buffer_capacity
            );
            println!("  Session: {}", state.reconnect_count);
            match device.config() {
                Ok(config) => {
                    println!(
                        "  Rates:   adc {} Hz, dac {} Hz",
                        config.sample_rate_adc, config.sample_rate_dac
                    );
                    println!(
                        "  Masks:   channels 0x{:02x}, icp 0x{:02x}",
                        config.mask_channel_adc, config.mask_icp
                    );
                    println!("  Gains:   {:?}", config.gain);
                }
                Err(e) => println!("  Config:  unavailable: {}", e),
            }
        }
        None => println!("{} did not connect within {:?}", device.ip(), CONNECT_TIMEOUT),
    }

    if let Err(e) = device.close() {
        eprintln!("close failed: {}", e);
    }
    Ok(())
}
