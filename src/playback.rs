//! DAC playback pacer.
//!
//! Keeps the device's playback ring filled at least one portion plus a
//! lookahead ahead of the device read pointer. Each tick writes as many
//! generated portions as needed to restore that margin.

use log::{debug, warn};

use crate::device::Device;
use crate::error::{Error, IoOp, Result};
use crate::sample::SampleSource;
use crate::tracker::{advance, available_samples, normalize};
use crate::types::{PortionSpec, SessionState};

/// Writes DAC portions to one channel.
pub struct PlaybackPacer {
    channel: u32,
    portion: u32,
    target_margin: u64,
    max_writes: u32,
    buffer: Vec<f32>,
    /// Capacity already reported as too small, so the warning is not repeated every tick.
    rejected_capacity: Option<u32>,
}

impl PlaybackPacer {
    pub fn new(channel: u32, portions: &PortionSpec) -> Self {
        Self {
            channel,
            portion: portions.dac_portion,
            target_margin: portions.dac_target_margin(),
            max_writes: portions.max_dac_writes_per_tick(),
            buffer: vec![0.0; portions.dac_portion as usize],
            rejected_capacity: None,
        }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Margin the pacer maintains ahead of the device read pointer.
    pub fn target_margin(&self) -> u64 {
        self.target_margin
    }

    /// Whether a ring of `capacity` samples can hold the target margin plus
    /// one more portion without the host lapping the device read pointer.
    pub fn fits(&self, capacity: u32) -> bool {
        self.target_margin + self.portion as u64 <= capacity as u64
    }

    /// Top the ring up to the target margin.
    ///
    /// Each portion advances `state.local_dac_pointer`, is filled by `source`
    /// and written so that it ends at the advanced pointer. The loop ends when
    /// the margin is met, after at most
    /// [`PortionSpec::max_dac_writes_per_tick`] writes.
    ///
    /// On a write failure the pointer is moved back to the last portion that
    /// was written and the error is returned; the next tick rewrites the slot.
    ///
    /// Returns the number of portions written.
    pub fn tick(
        &mut self,
        device: &mut Device,
        state: &mut SessionState,
        device_pointer: u32,
        capacity: u32,
        source: &mut dyn SampleSource,
    ) -> Result<usize> {
        if capacity == 0 {
            return Ok(0);
        }
        if !self.fits(capacity) {
            if self.rejected_capacity != Some(capacity) {
                warn!(
                    "dac channel {}: buffer of {} samples cannot hold {} samples margin plus a {} sample portion, output paused",
                    self.channel, capacity, self.target_margin, self.portion
                );
                self.rejected_capacity = Some(capacity);
            }
            return Ok(0);
        }
        self.rejected_capacity = None;

        state.local_dac_pointer = normalize(state.local_dac_pointer, capacity);
        let device_pointer = normalize(device_pointer, capacity);

        let mut written = 0;
        while written < self.max_writes as usize {
            let margin = available_samples(state.local_dac_pointer, device_pointer, capacity);
            if margin as u64 >= self.target_margin {
                break;
            }

            let committed = state.local_dac_pointer;
            state.local_dac_pointer = advance(committed, self.portion, capacity);
            source.fill(&mut self.buffer);

            if let Err(source) =
                device.write_channel(self.channel, state.local_dac_pointer, &self.buffer)
            {
                state.local_dac_pointer = committed;
                return Err(Error::Io {
                    op: IoOp::Write,
                    channel: self.channel,
                    source,
                });
            }
            written += 1;
        }

        if written > 0 {
            debug!(
                "dac channel {}: wrote {} portion(s), local pointer {} device pointer {}",
                self.channel, written, state.local_dac_pointer, device_pointer
            );
        }
        Ok(written)
    }
}
