//! Ring-buffer position arithmetic.
//!
//! The device reports positions in fixed-capacity circular buffers; the host
//! keeps its own position in each. These helpers convert a pair of positions
//! into a distance, assuming the leading side is less than one lap ahead.
//!
//! The same distance serves both directions:
//! - ADC: `available_samples(device_write, local_read, cap)` is new data to consume.
//! - DAC: `available_samples(local_write, device_read, cap)` is the margin already
//!   queued ahead of playback.
//!
//! Capacity must be large relative to the polling interval so the leader can
//! never lap the follower between two ticks. That is a sizing contract, not
//! something these functions can detect.

/// Distance from `trailing` forward to `leading` in a ring of `capacity` samples.
///
/// Both positions must be in `[0, capacity)`. The result is in `[0, capacity)`;
/// equal positions mean nothing is available.
pub fn available_samples(leading: u32, trailing: u32, capacity: u32) -> u32 {
    if capacity == 0 {
        return 0;
    }
    debug_assert!(leading < capacity && trailing < capacity);

    if leading > trailing {
        leading - trailing
    } else if leading < trailing {
        capacity - trailing + leading
    } else {
        0
    }
}

/// Move `pointer` forward by `step`, wrapping at `capacity`.
pub fn advance(pointer: u32, step: u32, capacity: u32) -> u32 {
    if capacity == 0 {
        return pointer;
    }
    ((pointer as u64 + step as u64) % capacity as u64) as u32
}

/// Bring a pointer that was initialised without knowing the capacity into range.
pub fn normalize(pointer: u32, capacity: u32) -> u32 {
    if capacity == 0 {
        pointer
    } else {
        pointer % capacity
    }
}
