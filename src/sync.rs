//! Sync search: finding the start of a coherent pulse train.
//!
//! Even a Manchester message starts with at least eight cycles of roughly
//! equal duration, and an ASK message is at least eight bits anyway, so a run
//! of eight matching cycles is a good discriminant between noise and signal.
//! While accumulating the run the searcher also tracks how many cycles had
//! near-equal halves; together with the locked duration that is enough to
//! pick the decoder.

use core::convert::Infallible;

use embedded_hal::digital::{InputPin, OutputPin};

use crate::consts::{
    CHECKSUM_SEED, MANCHESTER_MIN_HITS, MIN_CYCLE_TICKS, OOK_MIN_CYCLE, SYNC_LEN, SYNC_TOLERANCE,
};
use crate::driver::{Bridge, RunningState};
use crate::ring::abs_sub;

/// Where the searcher resumes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncPhase {
    /// Walking fresh pulses for a matching run.
    #[default]
    Searching,
    /// A decoder owns the running state; resume when it hands back control.
    WaitDecoder,
}

/// Resumable state of the sync-search task.
#[derive(Debug, Default)]
pub(crate) struct SyncTask {
    pub phase: SyncPhase,
    /// Local read cursor into the pulse ring.
    pub pi: u8,
    /// First pulse of the current matching run.
    pub sync_start: u8,
    /// Length of the matching run, capped at [`SYNC_LEN`].
    pub sync_len: u8,
    /// Cycles in the run whose halves were near-equal.
    pub manchester_hits: u8,
    /// Decoder handed the message, for the ASK-to-Manchester retry.
    pub chosen: RunningState,
}

impl SyncTask {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl<RX, TX, ANT> Bridge<RX, TX, ANT>
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    /// One step of the sync-search task.
    pub(crate) fn poll_sync(&mut self) -> nb::Result<(), Infallible> {
        match self.sync.phase {
            SyncPhase::WaitDecoder => {
                // The decoder fell back to us. ASK is strict; if it failed
                // and the run had any Manchester smell, try again with the
                // Manchester decoder, you never know.
                if self.sync.chosen == RunningState::DecodingAsk
                    && self.sync.manchester_hits > 0
                    && !self.decoded
                {
                    self.sync.chosen = RunningState::DecodingManchester;
                    self.begin_decode(RunningState::DecodingManchester);
                    return Ok(());
                }
                self.sync.sync_len = 0;
                self.sync.manchester_hits = 0;
                self.sync_duration = 0;
                self.sync.pi = self.ring.msg_start; // play catchup
                self.sync.sync_start = self.sync.pi.wrapping_add(1);
                self.sync.phase = SyncPhase::Searching;
                Err(nb::Error::WouldBlock)
            }
            SyncPhase::Searching => {
                if self.sync.pi == self.ring.current {
                    // Ring drained. (Serial traffic is promoted to a command
                    // before dispatch, so nothing else to do here.)
                    return Err(nb::Error::WouldBlock);
                }
                while self.sync.pi != self.ring.current && self.sync.sync_len < SYNC_LEN {
                    let pulse = self.ring.get(self.sync.pi);
                    let mut p0 = pulse.low;
                    let mut p1 = pulse.high;
                    let mut d: u16 = p0 as u16 + p1 as u16;

                    // Long pulses may be a full clock next to half clocks;
                    // fold them so trains that don't open with a run of
                    // zeroes still register as consistent cycles.
                    if d > 0x70 {
                        if abs_sub(p0 / 2, p1) < (d / 8) as u8 {
                            p0 /= 2;
                            d = p0 as u16 + p1 as u16;
                        } else if abs_sub(p0, p1 / 2) < (d / 8) as u8 {
                            p1 /= 2;
                            d = p0 as u16 + p1 as u16;
                        } else if abs_sub((d / 2) as u8, self.sync_duration) < (d / 16) as u8 {
                            p0 /= 2;
                            p1 /= 2;
                            d /= 2;
                        }
                    }

                    if d < MIN_CYCLE_TICKS
                        || d.abs_diff(self.sync_duration as u16) > SYNC_TOLERANCE as u16
                    {
                        self.sync.sync_start = self.sync.pi;
                        self.sync_duration = d.min(255) as u8;
                        self.sync.sync_len = 0;
                        self.sync.manchester_hits = 0;
                    } else {
                        if abs_sub(p1, p0) < (d / 8) as u8 {
                            self.sync.manchester_hits += 1;
                        }
                        // Integrate half the difference with the previous
                        // cycle; some transmitters start sluggish and only
                        // gradually get to speed.
                        let sd = self.sync_duration as i16;
                        let tracked = sd + (d as i16 - sd) / 2;
                        self.sync_duration = tracked.clamp(0, 255) as u8;
                        self.sync.sync_len += 1;
                    }
                    self.sync.pi = self.sync.pi.wrapping_add(1);
                }

                if self.sync.sync_len == SYNC_LEN {
                    let next = if self.flags.display_pulses {
                        RunningState::DecodeRawPulses
                    } else if self.sync_duration > OOK_MIN_CYCLE {
                        RunningState::DecodingOok
                    } else if self.sync.manchester_hits > MANCHESTER_MIN_HITS {
                        RunningState::DecodingManchester
                    } else {
                        RunningState::DecodingAsk
                    };
                    debug!(
                        "sync locked: duration {} manchester {}",
                        self.sync_duration, self.sync.manchester_hits
                    );
                    self.sync.chosen = next;
                    self.begin_decode(next);
                    self.sync.phase = SyncPhase::WaitDecoder;
                    return Ok(());
                }
                Err(nb::Error::WouldBlock)
            }
        }
    }

    /// Seeds the shared decode state and hands the main loop to a decoder.
    pub(crate) fn begin_decode(&mut self, next: RunningState) {
        self.ring.msg_start = self.sync.sync_start;
        self.checksum = CHECKSUM_SEED;
        self.bit_count = 0;
        self.byte = 0;
        self.decoded = false;
        let start = self.ring.msg_start;
        match next {
            RunningState::DecodingAsk => self.ask.begin(start),
            RunningState::DecodingOok => self.ook.begin(start),
            RunningState::DecodingManchester => self.manchester.begin(start),
            RunningState::DecodeRawPulses => self.pulses.begin(start),
            _ => {}
        }
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::RunningState;
    use crate::ring::Pulse;
    use crate::testutil::{inject, sim_bridge};
    use std::vec::Vec;

    fn uniform(low: u8, high: u8, count: usize) -> Vec<Pulse> {
        std::iter::repeat(Pulse::new(low, high)).take(count).collect()
    }

    #[test]
    fn classifies_uniform_asymmetric_train_as_ask() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        // d = 0x50, halves far apart: plain ASK.
        inject(&mut bridge, &uniform(0x14, 0x3c, 9));
        bridge.poll();
        assert_eq!(bridge.state, RunningState::DecodingAsk);
        assert_eq!(bridge.ring.msg_start, 0);
    }

    #[test]
    fn classifies_symmetric_train_as_manchester() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        // d = 0x50, |p1 - p0| < d/8 on every accepted cycle.
        inject(&mut bridge, &uniform(0x28, 0x28, 9));
        bridge.poll();
        assert_eq!(bridge.state, RunningState::DecodingManchester);
    }

    #[test]
    fn classifies_long_cycles_as_ook_before_anything_else() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        // Symmetric too, but d = 0x90 > 0x80 wins as OOK.
        inject(&mut bridge, &uniform(0x48, 0x48, 9));
        bridge.poll();
        assert_eq!(bridge.state, RunningState::DecodingOok);
    }

    #[test]
    fn display_pulses_flag_overrides_classification() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        bridge.flags.display_pulses = true;
        inject(&mut bridge, &uniform(0x14, 0x3c, 9));
        bridge.poll();
        assert_eq!(bridge.state, RunningState::DecodeRawPulses);
    }

    #[test]
    fn inconsistent_cycles_keep_searching() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        let noise = [
            Pulse::new(0x30, 0x30),
            Pulse::new(0x10, 0x34),
            Pulse::new(0x32, 0x32),
            Pulse::new(0x12, 0x30),
            Pulse::new(0x36, 0x30),
            Pulse::new(0x10, 0x38),
            Pulse::new(0x30, 0x36),
            Pulse::new(0x14, 0x30),
            Pulse::new(0x34, 0x34),
        ];
        inject(&mut bridge, &noise);
        bridge.poll();
        assert_eq!(bridge.state, RunningState::SyncSearch);
    }

    #[test]
    fn full_clock_pulses_fold_into_the_run() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        // Half-clock cycles with a doubled low phase sprinkled in, as an
        // OOK data train looks after its preamble.
        let mut train = uniform(0x48, 0x48, 8);
        train.push(Pulse::new(0x90, 0x48));
        inject(&mut bridge, &train);
        bridge.poll();
        assert_eq!(bridge.state, RunningState::DecodingOok);
    }
}
