//! ADC acquisition pacer.
//!
//! Consumes whole, fixed-size portions from the device's ADC ring once enough
//! new samples have accumulated behind the device write pointer. A partial
//! portion is never read; the remainder carries over to the next tick.

use log::{debug, trace, warn};

use crate::device::Device;
use crate::error::{Error, IoOp, Result};
use crate::sample::{PortionInfo, SampleSink};
use crate::tracker::{advance, available_samples, normalize};
use crate::types::SessionState;

/// Reads ADC portions from one channel.
pub struct AcquisitionPacer {
    channel: u32,
    portion: u32,
    max_portions: u32,
    buffer: Vec<f32>,
    /// Capacity already reported as too small.
    rejected_capacity: Option<u32>,
}

impl AcquisitionPacer {
    /// Create a pacer reading `portion` samples from `channel`, at most
    /// `max_portions` times per tick.
    pub fn new(channel: u32, portion: u32, max_portions: u32) -> Self {
        Self {
            channel,
            portion,
            max_portions,
            buffer: vec![0.0; portion as usize],
            rejected_capacity: None,
        }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn portion(&self) -> u32 {
        self.portion
    }

    /// Whether a ring of `capacity` samples can ever hold a whole portion of
    /// unread data. The distance behind the write pointer stays below capacity.
    pub fn fits(&self, capacity: u32) -> bool {
        self.portion < capacity
    }

    /// Consume every whole portion available, up to the per-tick cap.
    ///
    /// Each portion advances `state.local_adc_pointer` first and is then read
    /// so that it ends at the advanced pointer. On a read failure the advanced
    /// pointer is kept, the portion is lost and the error is returned.
    ///
    /// Returns the number of portions handed to `sink`.
    pub fn tick(
        &mut self,
        device: &mut Device,
        state: &mut SessionState,
        device_pointer: u32,
        capacity: u32,
        sink: &mut dyn SampleSink,
    ) -> Result<usize> {
        if capacity == 0 {
            return Ok(0);
        }
        if !self.fits(capacity) {
            if self.rejected_capacity != Some(capacity) {
                warn!(
                    "adc channel {}: buffer of {} samples cannot hold a {} sample portion, acquisition paused",
                    self.channel, capacity, self.portion
                );
                self.rejected_capacity = Some(capacity);
            }
            return Ok(0);
        }
        self.rejected_capacity = None;

        state.local_adc_pointer = normalize(state.local_adc_pointer, capacity);
        let device_pointer = normalize(device_pointer, capacity);

        let mut read = 0;
        while read < self.max_portions as usize {
            let size = available_samples(device_pointer, state.local_adc_pointer, capacity);
            if size < self.portion {
                trace!(
                    "adc channel {}: {} of {} samples available",
                    self.channel,
                    size,
                    self.portion
                );
                break;
            }

            state.local_adc_pointer = advance(state.local_adc_pointer, self.portion, capacity);
            device
                .read_channel(self.channel, state.local_adc_pointer, &mut self.buffer)
                .map_err(|source| Error::Io {
                    op: IoOp::Read,
                    channel: self.channel,
                    source,
                })?;

            state.sample_counter += 1;
            read += 1;
            debug!(
                "adc channel {}: portion {} ends at {}",
                self.channel, state.sample_counter, state.local_adc_pointer
            );

            let info = PortionInfo {
                channel: self.channel,
                index: state.sample_counter,
                pointer: state.local_adc_pointer,
            };
            sink.on_portion(&info, &self.buffer);
        }

        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Discard;
    use crate::testutil::{Script, TestSession};
    use crate::types::PortionSpec;
    use std::sync::{Arc, Mutex};

    fn setup() -> (Device, Arc<Mutex<Script>>, SessionState) {
        let session = TestSession::new();
        let script = session.script();
        let device = Device::connect(session, "10.0.0.7").unwrap();
        let state = SessionState::new(&PortionSpec::new(250, 100, 0));
        (device, script, state)
    }

    #[test]
    fn partial_portion_is_not_read() {
        let (mut device, script, mut state) = setup();
        let mut pacer = AcquisitionPacer::new(3, 250, 1);

        for pointer in [0, 100, 249] {
            let n = pacer
                .tick(&mut device, &mut state, pointer, 1000, &mut Discard)
                .unwrap();
            assert_eq!(n, 0);
            assert_eq!(state.local_adc_pointer, 0);
        }
        assert_eq!(script.lock().unwrap().read_calls, 0);
        assert_eq!(state.sample_counter, 0);
    }

    #[test]
    fn full_portion_is_read_at_advanced_pointer() {
        let (mut device, script, mut state) = setup();
        let mut pacer = AcquisitionPacer::new(3, 250, 1);
        let mut seen = Vec::new();
        let mut sink = |info: &PortionInfo, samples: &[f32]| seen.push((*info, samples.to_vec()));

        let n = pacer
            .tick(&mut device, &mut state, 250, 1000, &mut sink)
            .unwrap();

        assert_eq!(n, 1);
        assert_eq!(state.local_adc_pointer, 250);
        assert_eq!(state.sample_counter, 1);
        assert_eq!(script.lock().unwrap().reads, vec![(3, 250, 250)]);
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].0,
            PortionInfo {
                channel: 3,
                index: 1,
                pointer: 250
            }
        );
        assert!(seen[0].1.iter().all(|s| *s == 250.0));
    }

    #[test]
    fn one_portion_per_tick_by_default() {
        let (mut device, script, mut state) = setup();
        let mut pacer = AcquisitionPacer::new(0, 250, 1);

        pacer
            .tick(&mut device, &mut state, 900, 1000, &mut Discard)
            .unwrap();
        assert_eq!(state.local_adc_pointer, 250);

        pacer
            .tick(&mut device, &mut state, 900, 1000, &mut Discard)
            .unwrap();
        assert_eq!(state.local_adc_pointer, 500);
        assert_eq!(script.lock().unwrap().read_calls, 2);
    }

    #[test]
    fn drains_up_to_cap() {
        let (mut device, script, mut state) = setup();
        let mut pacer = AcquisitionPacer::new(0, 250, 8);

        let n = pacer
            .tick(&mut device, &mut state, 900, 1000, &mut Discard)
            .unwrap();

        assert_eq!(n, 3);
        assert_eq!(state.local_adc_pointer, 750);
        assert_eq!(state.sample_counter, 3);
        let reads: Vec<u32> = script.lock().unwrap().reads.iter().map(|r| r.1).collect();
        assert_eq!(reads, vec![250, 500, 750]);
    }

    #[test]
    fn pointer_wraps_at_capacity() {
        let (mut device, script, mut state) = setup();
        let mut pacer = AcquisitionPacer::new(0, 250, 1);
        state.local_adc_pointer = 900;

        pacer
            .tick(&mut device, &mut state, 200, 1000, &mut Discard)
            .unwrap();

        assert_eq!(state.local_adc_pointer, 150);
        assert_eq!(script.lock().unwrap().reads, vec![(0, 150, 250)]);
    }

    #[test]
    fn read_failure_keeps_advanced_pointer() {
        let (mut device, script, mut state) = setup();
        script.lock().unwrap().fail_reads = vec![0];
        let mut pacer = AcquisitionPacer::new(3, 250, 4);
        let mut called = false;
        let mut sink = |_: &PortionInfo, _: &[f32]| called = true;

        let err = pacer
            .tick(&mut device, &mut state, 600, 1000, &mut sink)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Io {
                op: IoOp::Read,
                channel: 3,
                ..
            }
        ));
        assert!(!err.is_fatal());
        assert_eq!(state.local_adc_pointer, 250);
        assert_eq!(state.sample_counter, 0);
        assert!(!called);
    }

    #[test]
    fn zero_capacity_is_skipped() {
        let (mut device, script, mut state) = setup();
        let mut pacer = AcquisitionPacer::new(0, 250, 1);

        let n = pacer
            .tick(&mut device, &mut state, 0, 0, &mut Discard)
            .unwrap();

        assert_eq!(n, 0);
        assert_eq!(script.lock().unwrap().read_calls, 0);
    }

    #[test]
    fn portion_as_large_as_ring_is_never_read() {
        let (mut device, script, mut state) = setup();
        let mut pacer = AcquisitionPacer::new(0, 1000, 1);
        assert!(!pacer.fits(1000));
        assert!(pacer.fits(1001));

        for pointer in [0, 500, 999] {
            let n = pacer
                .tick(&mut device, &mut state, pointer, 1000, &mut Discard)
                .unwrap();
            assert_eq!(n, 0);
        }
        assert_eq!(script.lock().unwrap().read_calls, 0);
        assert_eq!(pacer.rejected_capacity, Some(1000));

        // A larger ring clears the rejection.
        pacer
            .tick(&mut device, &mut state, 0, 4000, &mut Discard)
            .unwrap();
        assert_eq!(pacer.rejected_capacity, None);
    }
}
