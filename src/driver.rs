//! The RF bridge driver.
//!
//! This module provides the [`Bridge`] struct: the half-duplex engine that
//! owns the transceiver pins, the pulse capture ring, the serial FIFOs and
//! every cooperative task. Two entry points drive it:
//!
//! - [`tick()`](Bridge::tick) is the timer-interrupt body. In receive mode it
//!   samples the receiver pin and counts phase durations into the ring; in
//!   transmit mode it replays the ring range onto the transmitter pin. It
//!   must be called at a fixed rate (the tick is the unit of every pulse
//!   measurement).
//! - [`poll()`](Bridge::poll) is the main-loop body. It dispatches exactly
//!   one cooperative task per call, chosen by the running state: sync
//!   search, one of the decoders, the trailer emitter or the command parser.
//!   Call it after every wakeup.
//!
//! The two layers share only the ring, its 8-bit cursors and a handful of
//! byte-wide fields, each with a single writer, so the split is safe on any
//! target with atomic byte loads. Under `critical-section` plumbing (see
//! [`crate::timer`]) both entry points run inside the same mutex and the
//! question doesn't even come up.

use core::convert::Infallible;
use core::mem::size_of;

use embedded_hal::digital::{InputPin, OutputPin, PinState};
use heapless::Deque;

use crate::command::CommandTask;
use crate::consts::{
    GLITCH_TICKS, MAX_TICKS_PER_PHASE, SERIAL_RX_CAP, SERIAL_TX_CAP,
};
use crate::decode::{AskTask, ManchesterTask, OokTask, RawTask};
use crate::ring::{Pulse, PulseRing};
use crate::sync::SyncTask;

/// Half-duplex transceiver mode.
///
/// Receiving and transmitting at once would only echo back a garbled copy of
/// our own signal, so the two timer compare channels are never armed
/// together; this enum names which side of the RF path is live.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransceiverMode {
    /// Both compare channels parked; the antenna switch is released.
    #[default]
    Idle,
    /// The sampler runs on compare channel A.
    Receiving,
    /// Transmit requested; the replay loads its first pulse on the next tick.
    StartTransmit,
    /// The replay is walking `msg_start..msg_end` on compare channel B.
    Transmitting,
}

/// Which cooperative task owns the main loop. Everything falls back to
/// `SyncSearch`.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunningState {
    /// Walking fresh pulses, looking for a coherent train.
    #[default]
    SyncSearch,
    /// Committed to an ASK message.
    DecodingAsk,
    /// Committed to an OOK message.
    DecodingOok,
    /// Committed to a Manchester message.
    DecodingManchester,
    /// Dumping raw pulse pairs (learning mode).
    DecodeRawPulses,
    /// A decoder finished; the trailer goes out on the next poll.
    DecodeDone,
    /// The command parser owns the serial link.
    ReceivingCommand,
}

/// The timer compare channel currently armed. At most one at a time; this is
/// the half-duplex contract in type form.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub(crate) enum TimerChannel {
    #[default]
    Off,
    /// Receive sampling.
    CompareA,
    /// Transmit replay.
    CompareB,
}

/// Host-toggled display switches.
#[derive(Default, Debug, Clone, Copy)]
pub(crate) struct DisplayFlags {
    /// Dump raw pulse pairs instead of demodulating (set by `PULSE`,
    /// cleared by `DEMOD`).
    pub display_pulses: bool,
    /// One-shot task state report (set by `STACK`).
    pub display_stacks: bool,
}

/// A pulse-level bridge between a 433 MHz ASK/OOK transceiver and a serial
/// host.
///
/// ## Type Parameters
///
/// - `RX`: receiver data pin, [`embedded_hal::digital::InputPin`]
/// - `TX`: transmitter data pin, [`embedded_hal::digital::OutputPin`]
/// - `ANT`: optional antenna-switch pin selecting the RF path
///
/// ## Example
///
/// ```rust
/// # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
/// use bridge433::driver::Bridge;
///
/// # let tx_pin = Pin::new(&[PinTransaction::set(PinState::Low)]);
/// # let rx_pin = Pin::new(&[PinTransaction::get(PinState::Low)]);
/// let mut bridge: Bridge<Pin, Pin, Pin> = Bridge::new(rx_pin, tx_pin, None);
/// bridge.start();
/// loop {
///     bridge.tick(); // from the timer ISR
///     bridge.poll(); // from the main loop
///     # break;
/// }
/// # bridge.rx.done();
/// # bridge.tx.done();
/// ```
#[derive(Debug)]
pub struct Bridge<RX, TX, ANT>
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    /// Receiver data pin.
    pub rx: RX,
    /// Transmitter data pin.
    pub tx: TX,
    /// Antenna switch pin, if the board has one.
    pub antenna: Option<ANT>,

    /// Current transceiver mode.
    pub mode: TransceiverMode,
    /// Current owner of the main loop.
    pub state: RunningState,
    pub(crate) timer: TimerChannel,

    pub(crate) ring: PulseRing,
    /// Free-running tick counter, for timeouts.
    pub(crate) tickcount: u8,

    serial_in: Deque<u8, SERIAL_RX_CAP>,
    serial_out: Deque<u8, SERIAL_TX_CAP>,

    pub(crate) flags: DisplayFlags,

    // Shared decode state, written by one task at a time.
    pub(crate) sync_duration: u8,
    pub(crate) checksum: u8,
    pub(crate) byte: u8,
    pub(crate) bit_count: u8,
    pub(crate) decoded: bool,

    // Sampler edge latch.
    last_level: bool,

    // Transmit replay latch: ticks left in each phase, and the pin level.
    tx_pulse: Pulse,
    tx_level: bool,

    pub(crate) sync: SyncTask,
    pub(crate) ask: AskTask,
    pub(crate) ook: OokTask,
    pub(crate) manchester: ManchesterTask,
    pub(crate) pulses: RawTask,
    pub(crate) command: CommandTask,
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

impl<RX, TX, ANT> Bridge<RX, TX, ANT>
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    /// Creates a new bridge over the given pins.
    ///
    /// The transmitter is driven low immediately; nothing else is touched
    /// until [`start()`](Bridge::start) or one of the `enable_*` calls.
    pub fn new(rx: RX, tx: TX, antenna: Option<ANT>) -> Self {
        #[allow(unused_mut)]
        let mut tx = tx;
        let _ = tx.set_low(); // carrier off
        Self {
            rx,
            tx,
            antenna,
            mode: TransceiverMode::Idle,
            state: RunningState::SyncSearch,
            timer: TimerChannel::Off,
            ring: PulseRing::new(),
            tickcount: 0,
            serial_in: Deque::new(),
            serial_out: Deque::new(),
            flags: DisplayFlags::default(),
            sync_duration: 0,
            checksum: 0,
            byte: 0,
            bit_count: 0,
            decoded: false,
            last_level: false,
            tx_pulse: Pulse::default(),
            tx_level: false,
            sync: SyncTask::default(),
            ask: AskTask::default(),
            ook: OokTask::default(),
            manchester: ManchesterTask::default(),
            pulses: RawTask::default(),
            command: CommandTask::default(),
        }
    }

    /// Announces the firmware on the serial link and opens the receiver.
    pub fn start(&mut self) {
        self.push_str("* RF bridge ready\n");
        self.enable_receiver();
    }

    /// Advances the engine by one timer tick.
    ///
    /// Call from the timer compare ISR (or the delay loop) at the sampling
    /// rate. The tick counter runs even while both RF paths are parked, so
    /// serial timeouts keep counting during command reception.
    pub fn tick(&mut self) {
        match self.timer {
            TimerChannel::CompareA => self.sample_receiver(),
            TimerChannel::CompareB => self.transmit_step(),
            TimerChannel::Off => {}
        }
        self.tickcount = self.tickcount.wrapping_add(1);
    }

    /// Receive sampling: cheap filtered edge detection, nothing fancier.
    /// Everything here must finish well inside one tick.
    fn sample_receiver(&mut self) {
        let level = self.rx.is_high().unwrap_or(false);
        let cur = self.ring.current;

        // Count this tick against the phase we are in.
        let phase = self.ring.slot_mut(cur).phase_mut(level);
        if *phase < MAX_TICKS_PER_PHASE {
            *phase += 1;
        }

        // A rising edge closes the pulse; tiny ones are spikes and fold
        // into their neighbor instead of advancing.
        if level && !self.last_level {
            let closed = self.ring.get(cur);
            if closed.low > GLITCH_TICKS || closed.high > GLITCH_TICKS {
                self.ring.current = cur.wrapping_add(1);
            }
            let head = self.ring.current;
            self.ring.clear_slot(head);
        }
        self.last_level = level;
    }

    /// Transmit replay: walk the ring range, decrementing the remaining
    /// ticks of the current phase and driving the pin on phase flips.
    fn transmit_step(&mut self) {
        match self.mode {
            TransceiverMode::Transmitting => {
                {
                    let remaining = self.tx_pulse.phase_mut(self.tx_level);
                    if *remaining != 0 {
                        *remaining -= 1;
                    }
                    if *remaining != 0 {
                        return;
                    }
                }
                self.tx_level = !self.tx_level;
                if self.tx_level {
                    // Low phase done: move on to the next pulse.
                    self.ring.current = self.ring.current.wrapping_add(1);
                    self.tx_pulse = self.ring.get(self.ring.current);
                    if self.ring.current == self.ring.msg_end {
                        self.mode = TransceiverMode::Idle;
                        self.tx_level = false;
                    } else {
                        // A zero-length high phase is skipped outright.
                        self.tx_level = self.tx_pulse.high != 0;
                    }
                }
                let _ = self.tx.set_state(PinState::from(self.tx_level));
            }
            TransceiverMode::StartTransmit => {
                self.tx_level = true; // start phase is high
                self.mode = TransceiverMode::Transmitting;
                self.ring.current = self.ring.msg_start;
                self.tx_pulse = self.ring.get(self.ring.current);
                let _ = self.tx.set_high();
            }
            _ => {}
        }
    }

    /// Parks both compare channels and releases the antenna switch.
    pub fn disable_transceiver(&mut self) {
        self.mode = TransceiverMode::Idle;
        if let Some(ant) = self.antenna.as_mut() {
            let _ = ant.set_low();
        }
        self.timer = TimerChannel::Off;
    }

    /// Switches the RF path to the receiver and arms the sampler.
    pub fn enable_receiver(&mut self) {
        if self.timer == TimerChannel::CompareA {
            return;
        }
        self.timer = TimerChannel::Off;
        if let Some(ant) = self.antenna.as_mut() {
            let _ = ant.set_low();
        }
        trace!("receiver enabled");
        self.mode = TransceiverMode::Receiving;
        self.timer = TimerChannel::CompareA;
    }

    /// Switches the RF path to the transmitter and arms the replay.
    pub fn enable_transmitter(&mut self) {
        if self.timer == TimerChannel::CompareB {
            return;
        }
        self.timer = TimerChannel::Off;
        if let Some(ant) = self.antenna.as_mut() {
            let _ = ant.set_high();
        }
        trace!("transmitter enabled");
        self.mode = TransceiverMode::StartTransmit;
        self.timer = TimerChannel::CompareB;
    }

    /// Resolves once the replay has walked off the end of its range.
    pub fn transmit_done(&self) -> nb::Result<(), Infallible> {
        match self.mode {
            TransceiverMode::StartTransmit | TransceiverMode::Transmitting => {
                Err(nb::Error::WouldBlock)
            }
            _ => Ok(()),
        }
    }

    /// Runs one main-loop iteration: dispatches the task owning the current
    /// state, after promoting any pending serial byte to a command.
    ///
    /// A new command aborts an in-flight decode here, before dispatch, so
    /// the abort takes effect within one scheduler iteration.
    pub fn poll(&mut self) {
        if !self.serial_in.is_empty()
            && !matches!(
                self.state,
                RunningState::ReceivingCommand | RunningState::DecodeDone
            )
        {
            self.command.begin(self.tickcount);
            self.state = RunningState::ReceivingCommand;
        }
        match self.state {
            RunningState::SyncSearch => {
                if self.timer == TimerChannel::CompareA {
                    self.mode = TransceiverMode::Receiving;
                }
                let _ = self.poll_sync();
            }
            RunningState::DecodingAsk => {
                let _ = self.poll_ask();
            }
            RunningState::DecodingOok => {
                let _ = self.poll_ook();
            }
            RunningState::DecodingManchester => {
                let _ = self.poll_manchester();
            }
            RunningState::DecodeRawPulses => {
                let _ = self.poll_raw();
            }
            RunningState::DecodeDone => self.finish_message(),
            RunningState::ReceivingCommand => {
                let _ = self.poll_command();
            }
        }
        if self.flags.display_stacks {
            self.flags.display_stacks = false;
            self.dump_task_state();
        }
    }

    /// Emits the message trailer and returns control to the sync search.
    ///
    /// The bit count and the nominal pulse duration fold into the checksum
    /// before it is printed, per the line format.
    fn finish_message(&mut self) {
        self.checksum = self
            .checksum
            .wrapping_add(self.bit_count)
            .wrapping_add(self.sync_duration);
        if self.bit_count != 0 {
            self.push_byte(b'#');
            self.push_hex(self.bit_count);
            self.push_byte(b'!');
            self.push_hex(self.sync_duration);
            self.push_byte(b'*');
            self.push_hex(self.checksum);
            self.push_byte(b'\n');
        }
        self.state = RunningState::SyncSearch;
    }

    /// Answers the `STACK` command.
    ///
    /// The tasks are resumable state machines rather than stackful
    /// coroutines, so the report lists each task's state footprint in place
    /// of stack headroom.
    fn dump_task_state(&mut self) {
        self.push_task_usage("syncsearch", size_of::<SyncTask>());
        self.push_task_usage("decode_ask", size_of::<AskTask>());
        self.push_task_usage("decode_ook", size_of::<OokTask>());
        self.push_task_usage("decode_manchester", size_of::<ManchesterTask>());
        self.push_task_usage("decode_pulses", size_of::<RawTask>());
        self.push_task_usage("receive_cmd", size_of::<CommandTask>());
    }

    fn push_task_usage(&mut self, name: &str, bytes: usize) {
        self.push_str(name);
        self.push_byte(b' ');
        self.push_dec(bytes as u16);
        self.push_byte(b'/');
        self.push_dec(bytes as u16);
        self.push_byte(b'\n');
    }

    /// Feeds one byte from the host into the bridge. Call from the UART RX
    /// interrupt. A full FIFO drops the byte; the command parser's timeout
    /// and line-skip recovery pick up the pieces.
    pub fn uart_feed(&mut self, byte: u8) {
        let _ = self.serial_in.push_back(byte);
    }

    /// Takes the next byte headed for the host, or `WouldBlock` when the
    /// output FIFO is drained. Call from the UART TX-empty interrupt.
    pub fn uart_take(&mut self) -> nb::Result<u8, Infallible> {
        self.serial_out.pop_front().ok_or(nb::Error::WouldBlock)
    }

    /// Whether any output is waiting for the host.
    pub fn uart_pending(&self) -> bool {
        !self.serial_out.is_empty()
    }

    pub(crate) fn take_serial_in(&mut self) -> Option<u8> {
        self.serial_in.pop_front()
    }

    /// Queues one byte for the host. Output backpressure is the host's
    /// problem; an overfull FIFO drops bytes and the line checksum catches
    /// the damage downstream.
    pub(crate) fn push_byte(&mut self, byte: u8) {
        let _ = self.serial_out.push_back(byte);
    }

    pub(crate) fn push_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.push_byte(b);
        }
    }

    /// Two lowercase hex digits.
    pub(crate) fn push_hex(&mut self, value: u8) {
        self.push_byte(HEX_DIGITS[(value >> 4) as usize]);
        self.push_byte(HEX_DIGITS[(value & 0xf) as usize]);
    }

    fn push_dec(&mut self, value: u16) {
        let mut buf = [0u8; 5];
        let mut i = buf.len();
        let mut v = value;
        loop {
            i -= 1;
            buf[i] = b'0' + (v % 10) as u8;
            v /= 10;
            if v == 0 {
                break;
            }
        }
        for pos in i..buf.len() {
            self.push_byte(buf[pos]);
        }
    }

    /// `M<type>:` line header.
    pub(crate) fn emit_header(&mut self, msg_type: u8) {
        self.push_byte(b'M');
        self.push_byte(msg_type);
        self.push_byte(b':');
    }
}
