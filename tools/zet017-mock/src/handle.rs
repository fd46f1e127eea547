//! Test-side control of a running mock device.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use zet017_stream::DeviceConfig;

use crate::device::{Shared, Transfer};

/// Cloneable handle for driving and inspecting a [`MockDevice`](crate::MockDevice).
///
/// Stays usable after the session has been moved into a `Device` or closed.
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockHandle {
    pub(crate) fn new(shared: Arc<Mutex<Shared>>) -> Self {
        Self { shared }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------

    /// Bring the link up, starting a new device session.
    pub fn connect(&self) {
        self.lock().begin_session();
    }

    /// Drop the link. The reconnect counter is kept.
    pub fn disconnect(&self) {
        self.lock().drop_connection();
    }

    /// Renew the device session without ever reporting `connected = false`.
    pub fn reconnect(&self) {
        self.lock().begin_session();
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn reconnect_count(&self) -> u64 {
        self.lock().reconnect_count
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    // -------------------------------------------------------------------------
    // Ring pointers
    // -------------------------------------------------------------------------

    /// Produce `samples` more ADC samples.
    pub fn advance_adc(&self, samples: u64) {
        self.lock().adc_total += samples;
    }

    /// Produce ADC samples until the write pointer reaches `pointer`.
    pub fn set_adc_pointer(&self, pointer: u32) {
        let mut s = self.lock();
        let capacity = s.config.adc_capacity;
        let delta = (pointer % capacity + capacity - s.adc_pointer()) % capacity;
        s.adc_total += delta as u64;
    }

    /// Play `samples` more DAC samples.
    pub fn advance_dac(&self, samples: u64) {
        self.lock().dac_played += samples;
    }

    /// Play DAC samples until the read pointer reaches `pointer`.
    pub fn set_dac_pointer(&self, pointer: u32) {
        let mut s = self.lock();
        let capacity = s.config.dac_capacity;
        let delta = (pointer % capacity + capacity - s.dac_pointer()) % capacity;
        s.dac_played += delta as u64;
    }

    pub fn adc_pointer(&self) -> u32 {
        self.lock().adc_pointer()
    }

    pub fn dac_pointer(&self) -> u32 {
        self.lock().dac_pointer()
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    /// Fail the next `n` state queries.
    pub fn fail_next_state(&self, n: u32) {
        self.lock().faults.state = n;
    }

    pub fn fail_next_set_config(&self, n: u32) {
        self.lock().faults.set_config = n;
    }

    pub fn fail_next_start(&self, n: u32) {
        self.lock().faults.start = n;
    }

    pub fn fail_next_read(&self, n: u32) {
        self.lock().faults.read = n;
    }

    pub fn fail_next_write(&self, n: u32) {
        self.lock().faults.write = n;
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Most recent successful ADC reads, oldest first.
    pub fn reads(&self) -> Vec<Transfer> {
        self.lock().reads.iter().copied().collect()
    }

    /// Most recent successful DAC writes, oldest first.
    pub fn writes(&self) -> Vec<Transfer> {
        self.lock().writes.iter().copied().collect()
    }

    /// Every configuration pushed, including rejected ones.
    pub fn set_configs(&self) -> Vec<DeviceConfig> {
        self.lock().set_configs.clone()
    }

    /// `enable_output` of every start request, including rejected ones.
    pub fn starts(&self) -> Vec<bool> {
        self.lock().starts.clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.lock().stop_calls
    }

    pub fn state_calls(&self) -> usize {
        self.lock().state_calls
    }

    /// IP addresses removed from the session.
    pub fn removed(&self) -> Vec<String> {
        self.lock().removed.clone()
    }

    /// Snapshot of a DAC channel ring.
    pub fn dac_samples(&self, channel: u32) -> Vec<f32> {
        self.lock()
            .dac_ring
            .get(channel as usize)
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear_transfers(&self) {
        let mut s = self.lock();
        s.reads.clear();
        s.writes.clear();
    }
}
