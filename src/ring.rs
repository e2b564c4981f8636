//! The pulse capture buffer.
//!
//! Reception and replay both work on the same structure: a 256-slot circular
//! buffer of pulse-duration pairs with three 8-bit cursors. The sampler is
//! the only writer of `current`; every other party reads slots that have
//! already passed it, so field-level single-writer discipline plus the
//! cooperative scheduler is all the synchronization the engine needs.

use crate::consts::{MAX_TICKS_PER_PHASE, RING_LEN};

/// One captured cycle: tick counts for the low and high phase between two
/// rising edges.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pulse {
    /// Ticks spent low.
    pub low: u8,
    /// Ticks spent high.
    pub high: u8,
}

impl Pulse {
    /// Builds a pulse from its two phase durations.
    pub const fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    /// Full cycle duration. Widened so the sum can't wrap.
    pub fn cycle(&self) -> u16 {
        self.low as u16 + self.high as u16
    }

    /// Duration of the phase matching a pin level.
    pub fn phase(&self, level: bool) -> u8 {
        if level {
            self.high
        } else {
            self.low
        }
    }

    /// Mutable duration of the phase matching a pin level.
    pub fn phase_mut(&mut self, level: bool) -> &mut u8 {
        if level {
            &mut self.high
        } else {
            &mut self.low
        }
    }

    /// A low phase that pegged the counter marks the end of a message.
    pub fn is_end_marker(&self) -> bool {
        self.low >= MAX_TICKS_PER_PHASE
    }
}

/// Circular buffer of 256 pulses plus the cursors the engine shares.
///
/// All cursor arithmetic is modulo 256 by construction; distances use
/// [`ovf_sub`].
#[derive(Debug)]
pub struct PulseRing {
    slots: [Pulse; RING_LEN],
    /// Sampler write head (transmit read head while replaying).
    pub current: u8,
    /// First pulse of the message being decoded or replayed.
    pub msg_start: u8,
    /// One past the last pulse of a replay range.
    pub msg_end: u8,
}

impl PulseRing {
    /// An empty ring with all cursors at zero.
    pub const fn new() -> Self {
        Self {
            slots: [Pulse::new(0, 0); RING_LEN],
            current: 0,
            msg_start: 0,
            msg_end: 0,
        }
    }

    /// Reads the slot at a wrapped index.
    pub fn get(&self, index: u8) -> Pulse {
        self.slots[index as usize]
    }

    /// Overwrites the slot at a wrapped index.
    pub fn set(&mut self, index: u8, pulse: Pulse) {
        self.slots[index as usize] = pulse;
    }

    /// Mutable access to a slot, for the sampler's in-place counting.
    pub fn slot_mut(&mut self, index: u8) -> &mut Pulse {
        &mut self.slots[index as usize]
    }

    /// Zeroes a slot so it can start counting a fresh cycle.
    pub fn clear_slot(&mut self, index: u8) {
        self.slots[index as usize] = Pulse::new(0, 0);
    }
}

impl Default for PulseRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap-around cursor distance: how far `to` is ahead of `from`, modulo 256.
pub fn ovf_sub(from: u8, to: u8) -> u8 {
    to.wrapping_sub(from)
}

/// Absolute difference of two durations.
pub fn abs_sub(a: u8, b: u8) -> u8 {
    if a > b {
        a - b
    } else {
        b - a
    }
}
