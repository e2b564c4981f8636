//! The inbound command parser.
//!
//! Commands arrive on the serial link as single lines. The message format is
//! the same one the decoders emit, so a host can replay anything it has
//! captured: `M<type>` selects the transmit encoding, `:` introduces hex
//! payload, `!` the nominal pulse duration, `#` the bit count and `*` the
//! checksum claim that triggers the transmit. Three text commands round it
//! out: `PULSE` and `DEMOD` toggle raw pulse display, `STACK` requests a
//! task report.
//!
//! There is no line buffer: a 255-bit payload would need half a kilobyte of
//! it. Bytes are parsed as they arrive and expanded straight into the pulse
//! ring, with a tick-based idle timeout so a half-received line can't wedge
//! the parser.

use core::convert::Infallible;

use embedded_hal::digital::{InputPin, OutputPin};

use crate::consts::{
    CHECKSUM_SEED, DEFAULT_ASK_CYCLE, DEFAULT_MANCHESTER_CYCLE, MAX_TICKS_PER_PHASE,
    MIN_TRANSMIT_PULSES, RECV_TIMEOUT_TICKS, TRANSMIT_REPEATS,
};
use crate::driver::{Bridge, RunningState};
use crate::ring::Pulse;

/// The text commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextAction {
    /// `PULSE`: display raw pulses instead of demodulating.
    Pulse,
    /// `DEMOD`: back to demodulated output.
    Demod,
    /// `STACK`: dump per-task state usage.
    Stack,
}

/// Where the parser resumes when the next byte arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum CmdState {
    /// Waiting for the first byte of a line.
    #[default]
    Idle,
    /// Got `M`, waiting for the message type.
    TypeChar,
    /// Between tokens, waiting for a key character.
    Key,
    /// Inside a `:` payload run.
    HexPayload { first: Option<u8> },
    /// Two-digit argument of `!`, `#` or `*`.
    HexArg { key: u8, first: Option<u8> },
    /// Matching the tail of a text command.
    Match {
        text: &'static str,
        index: u8,
        action: TextAction,
    },
    /// Discarding bytes until end of line.
    SkipLine,
    /// Replaying the ring; counts the transmissions left.
    Transmit { retries: u8 },
}

/// Resumable state of the command parser.
#[derive(Debug, Default)]
pub(crate) struct CommandTask {
    pub state: CmdState,
    /// Offending byte to echo, zero when the line is clean.
    pub err: u8,
    /// Whether the line deserves a `*OK`.
    pub ok: bool,
    /// Running additive checksum of the inbound line.
    pub chk: u8,
    /// Selected transmit encoding (`A`, `M` or `P`).
    pub msg_type: u8,
    /// High byte of a half-received raw pulse pair.
    pub pulse_hi: Option<u8>,
    /// Tick of the last serial activity, for the idle timeout.
    pub last_tick: u8,
    /// Accumulated idle ticks since then.
    pub idle: u16,
}

impl CommandTask {
    /// Arms the parser for a fresh line.
    pub fn begin(&mut self, tick: u8) {
        *self = Self::default();
        self.last_tick = tick;
    }
}

/// Outcome of asking the serial FIFO for a byte.
enum CmdRecv {
    Byte(u8),
    Starved,
    TimedOut,
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

impl<RX, TX, ANT> Bridge<RX, TX, ANT>
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    /// One step of the command parser: consume whatever is buffered, wait
    /// out a transmit in flight, or give up on a stalled line.
    pub(crate) fn poll_command(&mut self) -> nb::Result<(), Infallible> {
        loop {
            if let CmdState::Transmit { retries } = self.command.state {
                if self.transmit_done().is_err() {
                    return Err(nb::Error::WouldBlock);
                }
                self.disable_transceiver();
                if retries <= 1 {
                    self.enable_receiver();
                    self.command.state = CmdState::SkipLine;
                    continue;
                }
                self.enable_transmitter();
                self.command.state = CmdState::Transmit {
                    retries: retries - 1,
                };
                return Err(nb::Error::WouldBlock);
            }
            let b = match self.cmd_recv() {
                CmdRecv::Byte(b) => b,
                CmdRecv::Starved => return Err(nb::Error::WouldBlock),
                CmdRecv::TimedOut => {
                    // Stalled mid-line; drop it and get back to listening.
                    self.finish_cmd();
                    return Ok(());
                }
            };
            self.cmd_byte(b);
            if self.state != RunningState::ReceivingCommand {
                return Ok(());
            }
        }
    }

    fn cmd_recv(&mut self) -> CmdRecv {
        if let Some(b) = self.take_serial_in() {
            self.command.idle = 0;
            self.command.last_tick = self.tickcount;
            return CmdRecv::Byte(b);
        }
        let now = self.tickcount;
        let delta = now.wrapping_sub(self.command.last_tick) as u16;
        self.command.last_tick = now;
        self.command.idle = self.command.idle.saturating_add(delta);
        if self.command.idle >= RECV_TIMEOUT_TICKS {
            CmdRecv::TimedOut
        } else {
            CmdRecv::Starved
        }
    }

    fn cmd_byte(&mut self, b: u8) {
        match self.command.state {
            CmdState::Idle => {
                // The line is ours now; mute the radio until it is handled.
                self.disable_transceiver();
                match b {
                    b'M' => self.command.state = CmdState::TypeChar,
                    b'P' => {
                        self.command.state = CmdState::Match {
                            text: "PULSE\n",
                            index: 1,
                            action: TextAction::Pulse,
                        }
                    }
                    b'D' => {
                        self.command.state = CmdState::Match {
                            text: "DEMOD\n",
                            index: 1,
                            action: TextAction::Demod,
                        }
                    }
                    b'S' => {
                        self.command.state = CmdState::Match {
                            text: "STACK\n",
                            index: 1,
                            action: TextAction::Stack,
                        }
                    }
                    _ => {
                        if b < b' ' {
                            self.finish_cmd();
                        } else {
                            self.command.err = b;
                            self.command.state = CmdState::SkipLine;
                        }
                    }
                }
            }
            CmdState::TypeChar => {
                match b {
                    b'A' => self.sync_duration = DEFAULT_ASK_CYCLE,
                    b'M' => self.sync_duration = DEFAULT_MANCHESTER_CYCLE,
                    b'P' => {}
                    _ => {
                        self.command.err = b;
                        self.command.state = CmdState::SkipLine;
                        return;
                    }
                }
                self.command.msg_type = b;
                self.command.chk = CHECKSUM_SEED;
                self.command.pulse_hi = None;
                self.bit_count = 0;
                self.command.state = CmdState::Key;
            }
            CmdState::Key => self.cmd_key(b),
            CmdState::HexPayload { first } => {
                if let Some(v) = hex_nibble(b) {
                    match first {
                        None => self.command.state = CmdState::HexPayload { first: Some(v) },
                        Some(hi) => {
                            let byte = (hi << 4) | v;
                            self.command.chk = self.command.chk.wrapping_add(byte);
                            self.expand_payload(byte);
                            self.command.state = CmdState::HexPayload { first: None };
                        }
                    }
                } else {
                    // Not hex: the payload run is over and this byte is the
                    // next token key.
                    self.cmd_key(b);
                }
            }
            CmdState::HexArg { key, first } => {
                if let Some(v) = hex_nibble(b) {
                    match first {
                        None => {
                            self.command.state = CmdState::HexArg {
                                key,
                                first: Some(v),
                            }
                        }
                        Some(hi) => self.cmd_arg(key, (hi << 4) | v),
                    }
                } else {
                    // Torn argument; drop the line quietly.
                    self.command.state = CmdState::SkipLine;
                    if b < b' ' {
                        self.finish_cmd();
                    }
                }
            }
            CmdState::Match {
                text,
                index,
                action,
            } => {
                if b == text.as_bytes()[index as usize] {
                    if index as usize + 1 == text.len() {
                        match action {
                            TextAction::Pulse => self.flags.display_pulses = true,
                            TextAction::Demod => self.flags.display_pulses = false,
                            TextAction::Stack => self.flags.display_stacks = true,
                        }
                        self.command.ok = true;
                        self.finish_cmd();
                    } else {
                        self.command.state = CmdState::Match {
                            text,
                            index: index + 1,
                            action,
                        };
                    }
                } else {
                    self.command.err = b;
                    if b < b' ' {
                        self.finish_cmd();
                    } else {
                        self.command.state = CmdState::SkipLine;
                    }
                }
            }
            CmdState::SkipLine => {
                if b < b' ' {
                    self.finish_cmd();
                }
            }
            CmdState::Transmit { .. } => {}
        }
    }

    fn cmd_key(&mut self, b: u8) {
        match b {
            b':' => self.command.state = CmdState::HexPayload { first: None },
            b'!' | b'#' | b'*' => {
                self.command.state = CmdState::HexArg {
                    key: b,
                    first: None,
                }
            }
            _ => {
                self.command.err = b;
                if b < b' ' {
                    self.finish_cmd();
                } else {
                    self.command.state = CmdState::SkipLine;
                }
            }
        }
    }

    fn cmd_arg(&mut self, key: u8, value: u8) {
        match key {
            b'!' => {
                self.sync_duration = value;
                self.command.chk = self.command.chk.wrapping_add(value);
                self.command.state = CmdState::Key;
            }
            b'#' => {
                self.bit_count = value;
                self.command.chk = self.command.chk.wrapping_add(value);
                self.command.state = CmdState::Key;
            }
            b'*' => {
                if value == self.command.chk {
                    self.command.ok = true;
                    self.trigger_transmit();
                } else {
                    debug!("inbound checksum mismatch");
                    self.command.err = b'*';
                    self.command.state = CmdState::SkipLine;
                }
            }
            _ => {}
        }
    }

    /// Expands one payload byte according to the selected encoding.
    fn expand_payload(&mut self, byte: u8) {
        match self.command.msg_type {
            b'A' => {
                let long = self.sync_duration - self.sync_duration / 4;
                let short = self.sync_duration / 4;
                for i in 0..8 {
                    let idx = self.bit_count;
                    if (byte >> (7 - i)) & 1 == 1 {
                        self.ring.set(idx, Pulse::new(short, long));
                    } else {
                        self.ring.set(idx, Pulse::new(long, short));
                    }
                    self.bit_count = self.bit_count.wrapping_add(1);
                }
            }
            b'P' => match self.command.pulse_hi.take() {
                None => self.command.pulse_hi = Some(byte),
                Some(high) => {
                    let idx = self.bit_count;
                    self.ring.set(idx, Pulse::new(byte, high));
                    self.bit_count = self.bit_count.wrapping_add(1);
                }
            },
            // `M` payloads have no pulse image; they are checksummed and
            // otherwise ignored.
            _ => {}
        }
    }

    /// Seals the ring with the end sentinel and keys up the transmitter,
    /// unless the message is too short to bother.
    fn trigger_transmit(&mut self) {
        self.ring
            .set(self.bit_count, Pulse::new(MAX_TICKS_PER_PHASE, 0));
        self.ring.msg_end = self.bit_count.wrapping_add(1);
        self.ring.msg_start = 0;
        if self.bit_count <= MIN_TRANSMIT_PULSES {
            // too small, don't bother
            self.command.state = CmdState::SkipLine;
            return;
        }
        if self.command.msg_type == b'M' {
            // Nothing was expanded for this type; accept and stay off the
            // air.
            self.command.state = CmdState::SkipLine;
            return;
        }
        if self.command.msg_type == b'A' {
            // Re-derive the pulse widths now that the line's own `!` token
            // (which trails the payload in emitted lines) has been seen.
            self.rescale_ask_pulses();
        }
        self.enable_transmitter();
        self.command.state = CmdState::Transmit {
            retries: TRANSMIT_REPEATS,
        };
    }

    fn rescale_ask_pulses(&mut self) {
        let long = self.sync_duration - self.sync_duration / 4;
        let short = self.sync_duration / 4;
        let mut i = 0u8;
        while i != self.bit_count {
            let p = self.ring.get(i);
            if p.high > p.low {
                self.ring.set(i, Pulse::new(short, long));
            } else {
                self.ring.set(i, Pulse::new(long, short));
            }
            i = i.wrapping_add(1);
        }
    }

    /// Ends the line: reports, re-opens the receiver and resets the engine
    /// to a clean listening state.
    fn finish_cmd(&mut self) {
        if self.command.err != 0 {
            let err = self.command.err;
            self.push_byte(b'!');
            self.push_byte(err);
            self.push_byte(b'\n');
        } else if self.command.ok {
            self.push_str("*OK\n");
        }
        self.enable_receiver();
        self.state = RunningState::SyncSearch;
        self.ring.msg_start = 0;
        self.ring.msg_end = 0;
        self.ring.current = 0;
        self.sync.reset();
        let tick = self.tickcount;
        self.command.begin(tick);
    }
}
