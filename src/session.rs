//! Session lifecycle controller.
//!
//! Watches the per-tick [`DeviceState`] for connection changes and owns the
//! [`SessionState`] that the pacers work on. The controller moves through
//! [`LinkState::Disconnected`], [`LinkState::Unconfigured`] and
//! [`LinkState::Configured`]:
//!
//! - A connect, or a changed reconnect counter while connected, starts a new
//!   device session: all host-side stream state is reset and the device
//!   identity is fetched.
//! - While unconfigured, the configuration is pushed and the device started
//!   once per tick until both succeed.
//! - A disconnect stops the device (best-effort) if it was configured.
//! - A reconfigure while connected keeps the device session, so the local
//!   pointers are re-anchored to the device pointers of the next snapshot.
//!
//! There is no backoff; a failing configure step is simply retried on the
//! next tick.

use log::{info, warn};

use crate::device::Device;
use crate::error::{ConfigStage, Error, Result};
use crate::tracker::{advance, normalize};
use crate::types::{DeviceConfig, DeviceState, LinkState, PortionSpec, SessionState};

/// Connection change observed in one device state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed.
    None,
    /// A new device session began (first connect or reconnect).
    Connected,
    /// The device went away.
    Disconnected,
}

/// Drives the connect/configure/disconnect state machine for one device.
pub struct SessionController {
    portions: PortionSpec,
    device_config: DeviceConfig,
    enable_output: bool,
    link: LinkState,
    state: SessionState,
    /// Set by a reconfigure within a live session.
    reanchor: bool,
}

impl SessionController {
    pub fn new(portions: PortionSpec, device_config: DeviceConfig, enable_output: bool) -> Self {
        let state = SessionState::new(&portions);
        Self {
            portions,
            device_config,
            enable_output,
            link: LinkState::Disconnected,
            state,
            reanchor: false,
        }
    }

    /// Replace the portion sizes and device configuration.
    ///
    /// Host-side counters are reset. A connected device goes back to
    /// unconfigured so the new configuration is pushed on the next tick.
    /// The device keeps its ring positions across a reconfigure, so the next
    /// snapshot re-anchors the local pointers: the ADC read pointer to the
    /// device write pointer, the DAC write pointer to the start offset ahead
    /// of playback.
    pub fn configure(&mut self, portions: PortionSpec, device_config: DeviceConfig) {
        self.portions = portions;
        self.device_config = device_config;
        let identity = self.state.identity.take();
        self.state.reset(&self.portions);
        self.state.identity = identity;
        self.reanchor = self.state.previous_connected;
        if self.link == LinkState::Configured {
            self.link = LinkState::Unconfigured;
        }
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn portions(&self) -> &PortionSpec {
        &self.portions
    }

    pub fn device_config(&self) -> &DeviceConfig {
        &self.device_config
    }

    /// Feed one device state snapshot and apply any connection transition.
    pub fn observe(&mut self, device: &mut Device, snapshot: &DeviceState) -> Transition {
        let renewed = snapshot.connected
            && (!self.state.previous_connected
                || snapshot.reconnect_count != self.state.previous_reconnect_count);
        let lost = !snapshot.connected && self.state.previous_connected;

        let transition = if renewed {
            self.on_connect(device, snapshot);
            Transition::Connected
        } else if lost {
            self.on_disconnect(device);
            Transition::Disconnected
        } else {
            if self.reanchor && snapshot.connected {
                self.reanchor_to(snapshot);
            }
            Transition::None
        };
        if transition != Transition::None {
            self.reanchor = false;
        }

        self.state.previous_connected = snapshot.connected;
        self.state.previous_reconnect_count = snapshot.reconnect_count;
        transition
    }

    fn on_connect(&mut self, device: &mut Device, snapshot: &DeviceState) {
        if self.state.previous_connected {
            info!(
                "{}: session renewed (reconnect count {} -> {})",
                self.state.label(),
                self.state.previous_reconnect_count,
                snapshot.reconnect_count
            );
        }
        self.state.reset(&self.portions);

        match device.info() {
            Ok(identity) => {
                info!("{}: connected (version {})", identity, identity.version);
                self.state.identity = Some(identity);
            }
            Err(e) => {
                warn!("{}: connected, device info unavailable: {}", device.ip(), e);
            }
        }
        self.link = LinkState::Unconfigured;
    }

    fn reanchor_to(&mut self, snapshot: &DeviceState) {
        self.reanchor = false;

        let adc_capacity = snapshot.adc_buffer_capacity;
        self.state.local_adc_pointer = normalize(snapshot.adc_write_pointer, adc_capacity);

        let dac_capacity = snapshot.dac_buffer_capacity;
        let offset = self.portions.dac_start_offset;
        self.state.local_dac_pointer = if dac_capacity == 0 {
            offset
        } else {
            advance(normalize(snapshot.dac_read_pointer, dac_capacity), offset, dac_capacity)
        };

        info!(
            "{}: reconfigured, adc read from {}, dac write from {}",
            self.state.label(),
            self.state.local_adc_pointer,
            self.state.local_dac_pointer
        );
    }

    fn on_disconnect(&mut self, device: &mut Device) {
        if self.link == LinkState::Configured {
            if let Err(e) = device.stop() {
                warn!("{}: stop on disconnect failed: {}", self.state.label(), e);
            }
        }
        info!("{}: disconnected", self.state.label());
        self.state.reset(&self.portions);
        self.link = LinkState::Disconnected;
    }

    /// Push the configuration and start the device if not yet done.
    ///
    /// On failure the controller stays unconfigured and the next call retries.
    pub fn ensure_configured(&mut self, device: &mut Device) -> Result<()> {
        if self.link != LinkState::Unconfigured {
            return Ok(());
        }

        device
            .set_config(&self.device_config)
            .map_err(|source| Error::Configuration {
                stage: ConfigStage::SetConfig,
                source,
            })?;
        device
            .start(self.enable_output)
            .map_err(|source| Error::Configuration {
                stage: ConfigStage::Start,
                source,
            })?;

        self.state.configured = true;
        self.link = LinkState::Configured;
        info!(
            "{}: started, adc {} Hz, dac {} Hz, output {}",
            self.state.label(),
            self.device_config.sample_rate_adc,
            self.device_config.sample_rate_dac,
            if self.enable_output { "on" } else { "off" }
        );
        Ok(())
    }

    /// Stop the device if it is running. Called once when polling ends.
    pub fn shutdown(&mut self, device: &mut Device) -> Result<()> {
        if self.link != LinkState::Configured {
            return Ok(());
        }
        self.state.configured = false;
        self.link = LinkState::Unconfigured;

        device.stop().map_err(Error::Stop)?;
        info!("{}: stopped", self.state.label());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeviceError;
    use crate::testutil::{Script, TestSession};
    use std::sync::{Arc, Mutex};

    fn setup() -> (Device, Arc<Mutex<Script>>, SessionController) {
        let session = TestSession::new();
        let script = session.script();
        let device = Device::connect(session, "10.0.0.7").unwrap();
        let portions = PortionSpec::new(250, 100, 200).with_dac_start_offset(300);
        let controller = SessionController::new(portions, DeviceConfig::default(), true);
        (device, script, controller)
    }

    fn snapshot(connected: bool, reconnect_count: u64) -> DeviceState {
        DeviceState {
            connected,
            reconnect_count,
            adc_buffer_capacity: 1000,
            dac_buffer_capacity: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn starts_disconnected() {
        let (_device, _script, controller) = setup();
        assert_eq!(controller.link_state(), LinkState::Disconnected);
        assert_eq!(controller.state().local_dac_pointer, 300);
    }

    #[test]
    fn connect_then_configure() {
        let (mut device, script, mut controller) = setup();

        assert_eq!(
            controller.observe(&mut device, &snapshot(false, 0)),
            Transition::None
        );
        assert_eq!(controller.link_state(), LinkState::Disconnected);

        assert_eq!(
            controller.observe(&mut device, &snapshot(true, 1)),
            Transition::Connected
        );
        assert_eq!(controller.link_state(), LinkState::Unconfigured);
        assert_eq!(
            controller.state().identity.as_ref().map(|i| i.serial),
            Some(42)
        );

        controller.ensure_configured(&mut device).unwrap();
        assert_eq!(controller.link_state(), LinkState::Configured);
        assert!(controller.state().configured);

        let script = script.lock().unwrap();
        assert_eq!(script.set_configs, vec![DeviceConfig::default()]);
        assert_eq!(script.starts, vec![true]);
    }

    #[test]
    fn steady_state_is_not_a_transition() {
        let (mut device, _script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        controller.ensure_configured(&mut device).unwrap();

        assert_eq!(
            controller.observe(&mut device, &snapshot(true, 1)),
            Transition::None
        );
        assert_eq!(controller.link_state(), LinkState::Configured);
    }

    #[test]
    fn reconnect_count_change_resets_state() {
        let (mut device, _script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        controller.ensure_configured(&mut device).unwrap();

        let state = controller.state_mut();
        state.sample_counter = 12;
        state.local_adc_pointer = 750;
        state.local_dac_pointer = 20;

        // Connected never observed false, but the session was renewed.
        assert_eq!(
            controller.observe(&mut device, &snapshot(true, 2)),
            Transition::Connected
        );
        let state = controller.state();
        assert_eq!(state.sample_counter, 0);
        assert_eq!(state.local_adc_pointer, 0);
        assert_eq!(state.local_dac_pointer, 300);
        assert!(!state.configured);
        assert_eq!(state.previous_reconnect_count, 2);
        assert_eq!(controller.link_state(), LinkState::Unconfigured);
    }

    #[test]
    fn configure_failure_is_retried() {
        let (mut device, script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        script.lock().unwrap().fail_start = true;

        let err = controller.ensure_configured(&mut device).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration {
                stage: ConfigStage::Start,
                ..
            }
        ));
        assert_eq!(controller.link_state(), LinkState::Unconfigured);

        script.lock().unwrap().fail_start = false;
        controller.ensure_configured(&mut device).unwrap();
        assert_eq!(controller.link_state(), LinkState::Configured);
        assert_eq!(script.lock().unwrap().starts.len(), 2);
    }

    #[test]
    fn set_config_failure_skips_start() {
        let (mut device, script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        script.lock().unwrap().fail_set_config = true;

        let err = controller.ensure_configured(&mut device).unwrap_err();
        assert!(matches!(
            err,
            Error::Configuration {
                stage: ConfigStage::SetConfig,
                ..
            }
        ));
        assert!(script.lock().unwrap().starts.is_empty());
    }

    #[test]
    fn disconnect_stops_configured_device() {
        let (mut device, script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        controller.ensure_configured(&mut device).unwrap();
        controller.state_mut().local_adc_pointer = 500;

        assert_eq!(
            controller.observe(&mut device, &snapshot(false, 1)),
            Transition::Disconnected
        );
        assert_eq!(controller.link_state(), LinkState::Disconnected);
        assert_eq!(controller.state().local_adc_pointer, 0);
        assert!(controller.state().identity.is_none());
        assert_eq!(script.lock().unwrap().stop_calls, 1);
    }

    #[test]
    fn disconnect_before_configure_does_not_stop() {
        let (mut device, script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        controller.observe(&mut device, &snapshot(false, 1));
        assert_eq!(script.lock().unwrap().stop_calls, 0);
    }

    #[test]
    fn failed_stop_on_disconnect_still_disconnects() {
        let (mut device, script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        controller.ensure_configured(&mut device).unwrap();
        script.lock().unwrap().fail_stop = true;

        controller.observe(&mut device, &snapshot(false, 1));
        assert_eq!(controller.link_state(), LinkState::Disconnected);
    }

    #[test]
    fn missing_identity_does_not_block_connect() {
        let (mut device, script, mut controller) = setup();
        script.lock().unwrap().fail_info = true;

        controller.observe(&mut device, &snapshot(true, 1));
        assert_eq!(controller.link_state(), LinkState::Unconfigured);
        assert!(controller.state().identity.is_none());
        assert_eq!(controller.state().label(), "<unidentified device>");
    }

    #[test]
    fn shutdown_stops_only_when_configured() {
        let (mut device, script, mut controller) = setup();
        controller.shutdown(&mut device).unwrap();
        assert_eq!(script.lock().unwrap().stop_calls, 0);

        controller.observe(&mut device, &snapshot(true, 1));
        controller.ensure_configured(&mut device).unwrap();
        script.lock().unwrap().fail_stop = true;

        let err = controller.shutdown(&mut device).unwrap_err();
        assert!(matches!(err, Error::Stop(DeviceError::NotConnected)));
        assert!(!err.is_fatal());
        assert_eq!(controller.link_state(), LinkState::Unconfigured);
        assert_eq!(script.lock().unwrap().stop_calls, 1);
    }

    #[test]
    fn reconfigure_pushes_new_config() {
        let (mut device, script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        controller.ensure_configured(&mut device).unwrap();

        let new_config = DeviceConfig::new(50_000, 100_000);
        controller.configure(PortionSpec::new(500, 100, 100), new_config.clone());
        assert_eq!(controller.link_state(), LinkState::Unconfigured);
        assert_eq!(controller.state().local_dac_pointer, 100);
        assert!(controller.state().identity.is_some());

        controller.ensure_configured(&mut device).unwrap();
        assert_eq!(script.lock().unwrap().set_configs.last(), Some(&new_config));
    }

    #[test]
    fn reconfigure_reanchors_to_running_device() {
        let (mut device, _script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        controller.ensure_configured(&mut device).unwrap();
        controller.state_mut().local_adc_pointer = 250;
        controller.state_mut().local_dac_pointer = 900;

        controller.configure(
            PortionSpec::new(250, 100, 200).with_dac_start_offset(300),
            DeviceConfig::default(),
        );

        let running = DeviceState {
            adc_write_pointer: 640,
            dac_read_pointer: 850,
            ..snapshot(true, 1)
        };
        assert_eq!(controller.observe(&mut device, &running), Transition::None);
        assert_eq!(controller.state().local_adc_pointer, 640);
        assert_eq!(controller.state().local_dac_pointer, 150);
        assert_eq!(controller.state().sample_counter, 0);

        // Applied once only.
        let later = DeviceState {
            adc_write_pointer: 900,
            dac_read_pointer: 950,
            ..snapshot(true, 1)
        };
        controller.observe(&mut device, &later);
        assert_eq!(controller.state().local_adc_pointer, 640);
        assert_eq!(controller.state().local_dac_pointer, 150);
    }

    #[test]
    fn reconnect_after_reconfigure_uses_initial_offsets() {
        let (mut device, _script, mut controller) = setup();
        controller.observe(&mut device, &snapshot(true, 1));
        controller.configure(
            PortionSpec::new(250, 100, 200).with_dac_start_offset(300),
            DeviceConfig::default(),
        );

        let renewed = DeviceState {
            adc_write_pointer: 640,
            dac_read_pointer: 850,
            ..snapshot(true, 2)
        };
        assert_eq!(controller.observe(&mut device, &renewed), Transition::Connected);
        assert_eq!(controller.state().local_adc_pointer, 0);
        assert_eq!(controller.state().local_dac_pointer, 300);
    }

    #[test]
    fn reconfigure_while_disconnected_waits_for_connect() {
        let (mut device, _script, mut controller) = setup();
        controller.configure(
            PortionSpec::new(250, 100, 200).with_dac_start_offset(300),
            DeviceConfig::default(),
        );
        assert_eq!(controller.observe(&mut device, &snapshot(true, 1)), Transition::Connected);
        assert_eq!(controller.state().local_dac_pointer, 300);
    }
}
