//! The decoders: ASK, OOK, Manchester and the raw pulse dump.
//!
//! Every decoder follows the same discipline. First a lock-in pass re-walks
//! the message from `msg_start` and demands a minimum run of pulses that fit
//! the modulation; printing garbage for every burst of noise that fooled the
//! sync search would drown the host, and failed lock-ins happen all the
//! time. Only then does the decoder emit its header and stream bits until
//! the low phase of a pulse pegs the counter, which is the end-of-message
//! marker.
//!
//! Decoded bits are packed MSB-first and leave as hex through the bit
//! stuffer, which also folds every flushed byte into the running checksum.

use core::convert::Infallible;

use embedded_hal::digital::{InputPin, OutputPin};

use crate::consts::{
    ASK_LOCK_IN, MANCHESTER_LOCK_IN, MANCHESTER_MAX_BITS, OOK_LOCK_IN, SYNC_TOLERANCE,
};
use crate::driver::{Bridge, RunningState};
use crate::ring::abs_sub;

/// Where a decoder resumes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DecodePhase {
    /// Counting matching pulses before committing.
    #[default]
    LockIn,
    /// Header sent; streaming bits.
    Emit,
}

/// Resumable state of the ASK decoder.
#[derive(Debug, Default)]
pub(crate) struct AskTask {
    pub phase: DecodePhase,
    pub pi: u8,
    pub pcount: u8,
}

impl AskTask {
    pub fn begin(&mut self, start: u8) {
        self.phase = DecodePhase::LockIn;
        self.pi = start;
        self.pcount = 0;
    }
}

/// Resumable state of the OOK decoder.
#[derive(Debug, Default)]
pub(crate) struct OokTask {
    pub phase: DecodePhase,
    pub pi: u8,
    pub pcount: u8,
}

impl OokTask {
    pub fn begin(&mut self, start: u8) {
        self.phase = DecodePhase::LockIn;
        self.pi = start;
        self.pcount = 0;
    }
}

/// Resumable state of the Manchester decoder.
#[derive(Debug, Default)]
pub(crate) struct ManchesterTask {
    pub phase: DecodePhase,
    pub pi: u8,
    pub pcount: u8,
    /// Latched bit value, re-emitted until the polarity changes.
    pub bit: u8,
    /// Which half of the pulse the demi-clock is examining; high first.
    pub level: bool,
    /// Half-bits consumed so far.
    pub demi_clock: u8,
    /// Half-bits already emitted.
    pub stuff_clock: u8,
}

impl ManchesterTask {
    pub fn begin(&mut self, start: u8) {
        self.phase = DecodePhase::LockIn;
        self.pi = start;
        self.pcount = 0;
        self.bit = 0;
        self.level = true;
        self.demi_clock = 0;
        self.stuff_clock = 0;
    }
}

/// Resumable state of the raw pulse dump.
#[derive(Debug, Default)]
pub(crate) struct RawTask {
    pub started: bool,
    pub pi: u8,
}

impl RawTask {
    pub fn begin(&mut self, start: u8) {
        self.started = false;
        self.pi = start;
    }
}

impl<RX, TX, ANT> Bridge<RX, TX, ANT>
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    /// Packs the next bit MSB-first, flushing a hex byte every eighth bit.
    pub(crate) fn stuff_bit(&mut self, bit: u8) {
        let bn = self.bit_count % 8;
        self.byte |= bit << (7 - bn);
        self.bit_count = self.bit_count.wrapping_add(1);
        if bn == 7 {
            let full = self.byte;
            self.checksum = self.checksum.wrapping_add(full);
            self.push_hex(full);
            self.byte = 0;
        }
    }

    /// Flushes a trailing partial byte at end of message.
    pub(crate) fn flush_partial(&mut self) {
        if self.bit_count % 8 != 0 {
            let partial = self.byte;
            self.checksum = self.checksum.wrapping_add(partial);
            self.push_hex(partial);
            self.byte = 0;
        }
    }

    /// One step of the ASK decoder: per pulse, the bit is simply which
    /// phase was longer.
    pub(crate) fn poll_ask(&mut self) -> nb::Result<(), Infallible> {
        loop {
            match self.ask.phase {
                DecodePhase::LockIn => {
                    while self.ask.pcount < ASK_LOCK_IN {
                        if self.ask.pi == self.ring.current {
                            return Err(nb::Error::WouldBlock);
                        }
                        let d = self.ring.get(self.ask.pi).cycle();
                        if d.abs_diff(self.sync_duration as u16) <= SYNC_TOLERANCE as u16 {
                            self.ask.pcount += 1;
                            self.ask.pi = self.ask.pi.wrapping_add(1);
                        } else {
                            break;
                        }
                    }
                    if self.ask.pcount < ASK_LOCK_IN {
                        self.decoded = false;
                        self.ring.msg_start = self.ask.pi;
                        self.state = RunningState::SyncSearch;
                        return Ok(());
                    }
                    self.decoded = true;
                    self.ask.pi = self.ring.msg_start; // restart at beginning
                    self.emit_header(b'A');
                    self.ask.phase = DecodePhase::Emit;
                }
                DecodePhase::Emit => {
                    if self.ask.pi == self.ring.current {
                        return Err(nb::Error::WouldBlock);
                    }
                    let p = self.ring.get(self.ask.pi);
                    let ending = p.is_end_marker();
                    self.stuff_bit(u8::from(p.high > p.low));
                    self.ask.pi = self.ask.pi.wrapping_add(1);
                    if ending {
                        self.flush_partial();
                        self.ring.msg_start = self.ask.pi;
                        self.state = RunningState::DecodeDone;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One step of the OOK decoder: a phase near the full cycle duration
    /// carries the bit, low for 0 and high for 1; a full cycle may carry
    /// both in order.
    pub(crate) fn poll_ook(&mut self) -> nb::Result<(), Infallible> {
        let margin = self.sync_duration / 8;
        loop {
            match self.ook.phase {
                DecodePhase::LockIn => {
                    let half = self.sync_duration / 2;
                    while self.ook.pcount < OOK_LOCK_IN {
                        if self.ook.pi == self.ring.current {
                            return Err(nb::Error::WouldBlock);
                        }
                        let p = self.ring.get(self.ook.pi);
                        if abs_sub(p.low, self.sync_duration) <= margin
                            || abs_sub(p.high, self.sync_duration) <= margin
                            || abs_sub(p.low, half) <= margin
                            || abs_sub(p.high, half) <= margin
                        {
                            self.ook.pcount += 1;
                            self.ook.pi = self.ook.pi.wrapping_add(1);
                        } else {
                            break;
                        }
                    }
                    if self.ook.pcount < OOK_LOCK_IN {
                        self.decoded = false;
                        self.ring.msg_start = self.ook.pi;
                        self.state = RunningState::SyncSearch;
                        return Ok(());
                    }
                    self.decoded = true;
                    self.ook.pi = self.ring.msg_start;
                    self.emit_header(b'O');
                    self.ook.phase = DecodePhase::Emit;
                }
                DecodePhase::Emit => {
                    if self.ook.pi == self.ring.current {
                        return Err(nb::Error::WouldBlock);
                    }
                    let p = self.ring.get(self.ook.pi);
                    let ending = p.is_end_marker();
                    if abs_sub(p.low, self.sync_duration) <= margin {
                        self.stuff_bit(0);
                    }
                    if abs_sub(p.high, self.sync_duration) <= margin {
                        self.stuff_bit(1);
                    }
                    self.ook.pi = self.ook.pi.wrapping_add(1);
                    if ending {
                        self.flush_partial();
                        self.ring.msg_start = self.ook.pi;
                        self.state = RunningState::DecodeDone;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One step of the Manchester decoder.
    ///
    /// Counts demi-clocks: the latched bit is emitted once per two
    /// half-bits, and a half whose duration is a whole clock (rather than a
    /// demi clock) flips the latch to that half's polarity.
    pub(crate) fn poll_manchester(&mut self) -> nb::Result<(), Infallible> {
        let margin = self.sync_duration / 4;
        loop {
            match self.manchester.phase {
                DecodePhase::LockIn => {
                    let half = self.sync_duration / 2;
                    while self.manchester.pcount < MANCHESTER_LOCK_IN {
                        if self.manchester.pi == self.ring.current {
                            return Err(nb::Error::WouldBlock);
                        }
                        let p = self.ring.get(self.manchester.pi);
                        if abs_sub(p.low, self.sync_duration) <= margin
                            || abs_sub(p.high, self.sync_duration) <= margin
                            || abs_sub(p.low, half) <= margin
                            || abs_sub(p.high, half) <= margin
                        {
                            self.manchester.pcount += 1;
                            self.manchester.pi = self.manchester.pi.wrapping_add(1);
                        } else {
                            break;
                        }
                    }
                    if self.manchester.pcount < MANCHESTER_LOCK_IN {
                        self.decoded = false;
                        self.ring.msg_start = self.manchester.pi;
                        self.state = RunningState::SyncSearch;
                        return Ok(());
                    }
                    self.decoded = true;
                    self.manchester.pi = self.ring.msg_start;
                    self.manchester.bit = 0;
                    self.manchester.level = true;
                    self.manchester.demi_clock = 0;
                    self.manchester.stuff_clock = 0;
                    self.emit_header(b'M');
                    self.manchester.phase = DecodePhase::Emit;
                }
                DecodePhase::Emit => {
                    if self.bit_count >= MANCHESTER_MAX_BITS {
                        // Overrun guard; no real message runs this long.
                        self.flush_partial();
                        self.ring.msg_start = self.manchester.pi;
                        self.state = RunningState::DecodeDone;
                        return Ok(());
                    }
                    if self.manchester.pi == self.ring.current {
                        return Err(nb::Error::WouldBlock);
                    }
                    let p = self.ring.get(self.manchester.pi);
                    let ending = p.is_end_marker();

                    if self.manchester.stuff_clock != self.manchester.demi_clock {
                        if self.manchester.stuff_clock & 1 == 1 {
                            let b = self.manchester.bit;
                            self.stuff_bit(b);
                        }
                        self.manchester.stuff_clock = self.manchester.stuff_clock.wrapping_add(1);
                    }
                    // A whole-clock half means the polarity changed here.
                    if abs_sub(p.phase(self.manchester.level), self.sync_duration) < margin {
                        self.manchester.bit = u8::from(self.manchester.level);
                        self.manchester.demi_clock = self.manchester.demi_clock.wrapping_add(1);
                    }
                    self.manchester.demi_clock = self.manchester.demi_clock.wrapping_add(1);
                    if self.manchester.stuff_clock != self.manchester.demi_clock {
                        if self.manchester.stuff_clock & 1 == 1 {
                            let b = self.manchester.bit;
                            self.stuff_bit(b);
                        }
                        self.manchester.stuff_clock = self.manchester.stuff_clock.wrapping_add(1);
                    }

                    if !self.manchester.level {
                        self.manchester.pi = self.manchester.pi.wrapping_add(1);
                    }
                    self.manchester.level = !self.manchester.level;

                    if ending {
                        self.flush_partial();
                        self.ring.msg_start = self.manchester.pi;
                        self.state = RunningState::DecodeDone;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// One step of the raw pulse dump: hex pulse pairs verbatim, high phase
    /// first, used for debug and for learning remotes.
    pub(crate) fn poll_raw(&mut self) -> nb::Result<(), Infallible> {
        if !self.pulses.started {
            self.emit_header(b'P');
            self.pulses.started = true;
        }
        loop {
            if self.pulses.pi == self.ring.current {
                return Err(nb::Error::WouldBlock);
            }
            let p = self.ring.get(self.pulses.pi);
            self.push_hex(p.high);
            self.push_hex(p.low);
            self.checksum = self.checksum.wrapping_add(p.high).wrapping_add(p.low);
            self.bit_count = self.bit_count.wrapping_add(1);
            self.pulses.pi = self.pulses.pi.wrapping_add(1);
            if p.is_end_marker() {
                self.ring.msg_start = self.pulses.pi;
                self.state = RunningState::DecodeDone;
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::driver::RunningState;
    use crate::ring::Pulse;
    use crate::testutil::{drain, inject, law_checksum, lines, run_polls, sim_bridge};
    use std::vec::Vec;

    /// One ASK pulse per bit at the given cycle duration.
    fn ask_pulses(bytes: &[u8], cycle: u8) -> Vec<Pulse> {
        let long = cycle - cycle / 4;
        let short = cycle / 4;
        let mut pulses = Vec::new();
        for &b in bytes {
            for i in 0..8 {
                if (b >> (7 - i)) & 1 == 1 {
                    pulses.push(Pulse::new(short, long));
                } else {
                    pulses.push(Pulse::new(long, short));
                }
            }
        }
        pulses
    }

    /// Stretch the low phase of the last pulse into the end marker, the way
    /// trailing silence does on the air.
    fn saturate_last(pulses: &mut [Pulse]) {
        pulses.last_mut().unwrap().low = 0xff;
    }

    #[test]
    fn ask_bits_are_msb_first_longer_phase_wins() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        let mut pulses = ask_pulses(&[0xa5, 0x0f, 0x3c], 0x40);
        saturate_last(&mut pulses);
        inject(&mut bridge, &pulses);
        run_polls(&mut bridge, 8);

        let out = drain(&mut bridge);
        let line = lines(&out).into_iter().next().expect("no emission");
        let chk = law_checksum(&line);
        assert_eq!(line, std::format!("MA:a50f3c#18!40*{:02x}", chk));
    }

    #[test]
    fn ask_lock_in_failure_is_silent_then_recovers() {
        // 15 valid cycles, then inconsistent noise: nothing may be emitted.
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        let mut pulses: Vec<Pulse> =
            std::iter::repeat(Pulse::new(0x0c, 0x34)).take(15).collect();
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
            Pulse::new(0x11, 0x33),
        ];
        pulses.extend(noise);
        inject(&mut bridge, &pulses);
        run_polls(&mut bridge, 16);
        assert_eq!(drain(&mut bridge), "");
        assert_eq!(bridge.state, RunningState::SyncSearch);

        // 30 valid cycles ending in the marker: one emission, 30 bits.
        let mut tail: Vec<Pulse> =
            std::iter::repeat(Pulse::new(0x0c, 0x24)).take(30).collect();
        saturate_last(&mut tail);
        inject(&mut bridge, &tail);
        run_polls(&mut bridge, 16);
        let out = drain(&mut bridge);
        let line = lines(&out).into_iter().next().expect("no emission");
        assert!(line.starts_with("MA:"), "got {}", line);
        assert!(line.contains("#1e!"), "got {}", line);
        assert_eq!(law_checksum(&line), trailer_checksum(&line));
    }

    #[test]
    fn ask_saturation_after_48_bits_emits_six_payload_bytes() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        let mut pulses: Vec<Pulse> =
            std::iter::repeat(Pulse::new(0x0c, 0x24)).take(48).collect();
        saturate_last(&mut pulses);
        inject(&mut bridge, &pulses);
        run_polls(&mut bridge, 8);

        let out = drain(&mut bridge);
        let line = lines(&out).into_iter().next().expect("no emission");
        let payload = &line[3..line.find('#').unwrap()];
        assert_eq!(payload.len(), 12, "expected 6 payload bytes in {}", line);
        assert!(line.contains("#30!"), "got {}", line);
    }

    #[test]
    fn ook_full_width_phases_carry_the_bits() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        // Preamble of half-clock cycles, then one pulse per bit where the
        // full-width phase picks the value.
        let mut pulses: Vec<Pulse> =
            std::iter::repeat(Pulse::new(0x48, 0x48)).take(8).collect();
        for &b in &[0xc3u8, 0x5a] {
            for i in 0..8 {
                if (b >> (7 - i)) & 1 == 1 {
                    pulses.push(Pulse::new(0x48, 0x90));
                } else {
                    pulses.push(Pulse::new(0x90, 0x48));
                }
            }
        }
        pulses.push(Pulse::new(0xff, 0x48));
        inject(&mut bridge, &pulses);
        run_polls(&mut bridge, 8);

        let out = drain(&mut bridge);
        let line = lines(&out).into_iter().next().expect("no emission");
        let chk = law_checksum(&line);
        assert_eq!(line, std::format!("MO:c35a#10!90*{:02x}", chk));
    }

    #[test]
    fn manchester_uniform_half_clocks_stream_the_latched_bit() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        let mut pulses: Vec<Pulse> =
            std::iter::repeat(Pulse::new(0x20, 0x20)).take(33).collect();
        pulses.push(Pulse::new(0xff, 0x20));
        inject(&mut bridge, &pulses);
        run_polls(&mut bridge, 8);

        let out = drain(&mut bridge);
        let line = lines(&out).into_iter().next().expect("no emission");
        let chk = law_checksum(&line);
        assert_eq!(line, std::format!("MM:0000000000#21!40*{:02x}", chk));
    }

    #[test]
    fn manchester_full_clock_half_flips_the_latch() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        let mut pulses: Vec<Pulse> =
            std::iter::repeat(Pulse::new(0x20, 0x20)).take(9).collect();
        pulses.push(Pulse::new(0x20, 0x40)); // whole-clock high: polarity flip
        pulses.extend(std::iter::repeat(Pulse::new(0x20, 0x20)).take(26));
        pulses.push(Pulse::new(0xff, 0x20));
        inject(&mut bridge, &pulses);
        run_polls(&mut bridge, 8);

        let out = drain(&mut bridge);
        let line = lines(&out).into_iter().next().expect("no emission");
        assert!(line.starts_with("MM:007fff"), "got {}", line);
        assert_eq!(law_checksum(&line), trailer_checksum(&line));
    }

    #[test]
    fn raw_dump_prints_pulse_pairs_high_byte_first() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        bridge.flags.display_pulses = true;
        let mut pulses: Vec<Pulse> =
            std::iter::repeat(Pulse::new(0x30, 0x40)).take(9).collect();
        pulses.push(Pulse::new(0xff, 0x40));
        inject(&mut bridge, &pulses);
        run_polls(&mut bridge, 8);

        let out = drain(&mut bridge);
        let line = lines(&out).into_iter().next().expect("no dump");
        let payload = &line[3..line.find('#').unwrap()];
        assert!(line.starts_with("MP:"), "got {}", line);
        let mut expected = "4030".repeat(9);
        expected.push_str("40ff");
        assert_eq!(payload, expected);
        assert!(line.contains("#0a!70"), "got {}", line);
        assert_eq!(law_checksum(&line), trailer_checksum(&line));
    }

    #[test]
    fn ask_failure_with_manchester_smell_retries_as_manchester() {
        let mut bridge = sim_bridge(Vec::new());
        bridge.enable_receiver();
        // Eight d = 0x40 cycles, two of them symmetric: classified ASK with
        // a couple of manchester hits.
        let mut pulses = Vec::new();
        pulses.extend(std::iter::repeat(Pulse::new(0x10, 0x30)).take(3));
        pulses.extend(std::iter::repeat(Pulse::new(0x20, 0x20)).take(2));
        pulses.extend(std::iter::repeat(Pulse::new(0x10, 0x30)).take(3));
        // Half-clock train with one short cycle that breaks the ASK lock-in
        // but passes the Manchester one.
        pulses.extend(std::iter::repeat(Pulse::new(0x20, 0x20)).take(3));
        pulses.push(Pulse::new(0x18, 0x18));
        pulses.extend(std::iter::repeat(Pulse::new(0x20, 0x20)).take(28));
        pulses.push(Pulse::new(0xff, 0x20));
        inject(&mut bridge, &pulses);
        run_polls(&mut bridge, 16);

        let out = drain(&mut bridge);
        let emitted = lines(&out);
        assert_eq!(emitted.len(), 1, "expected a single emission: {:?}", emitted);
        assert!(emitted[0].starts_with("MM:"), "got {}", emitted[0]);
    }

    fn trailer_checksum(line: &str) -> u8 {
        u8::from_str_radix(&line[line.len() - 2..], 16).expect("trailer checksum")
    }
}
