//! Shared helpers for the unit tests: simulated pins, waveform generators
//! and serial capture.

use core::convert::Infallible;
use std::cell::Cell;
use std::rc::Rc;
use std::string::String;
use std::vec::Vec;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::driver::Bridge;
use crate::ring::Pulse;

/// Input pin replaying a scripted per-tick level sequence; holds the last
/// level once the script runs out.
#[derive(Debug)]
pub struct WavePin {
    levels: Vec<bool>,
    pos: usize,
}

impl WavePin {
    pub fn new(levels: Vec<bool>) -> Self {
        Self { levels, pos: 0 }
    }
}

impl ErrorType for WavePin {
    type Error = Infallible;
}

impl InputPin for WavePin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let level = self
            .levels
            .get(self.pos)
            .copied()
            .unwrap_or_else(|| self.levels.last().copied().unwrap_or(false));
        if self.pos < self.levels.len() {
            self.pos += 1;
        }
        Ok(level)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|level| !level)
    }
}

/// A shared digital level: the output side drives it, any number of input
/// sides sample it. Wires one bridge's transmitter to another's receiver.
#[derive(Debug, Clone)]
pub struct LevelCell(Rc<Cell<bool>>);

impl LevelCell {
    pub fn new() -> Self {
        Self(Rc::new(Cell::new(false)))
    }
}

impl ErrorType for LevelCell {
    type Error = Infallible;
}

impl InputPin for LevelCell {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.0.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.get())
    }
}

impl OutputPin for LevelCell {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }
}

/// The bridge flavor the scenario tests run on.
pub type SimBridge = Bridge<WavePin, LevelCell, LevelCell>;

/// A bridge with a scripted receiver and a shared-cell transmitter.
pub fn sim_bridge(levels: Vec<bool>) -> SimBridge {
    Bridge::new(WavePin::new(levels), LevelCell::new(), None)
}

/// Per-tick levels for a pulse train: high phase then low phase per pulse,
/// then enough silence to saturate the tail and a closing edge to publish
/// it.
pub fn wave(pulses: &[Pulse]) -> Vec<bool> {
    let mut levels = Vec::new();
    for p in pulses {
        levels.extend(std::iter::repeat(true).take(p.high as usize));
        levels.extend(std::iter::repeat(false).take(p.low as usize));
    }
    levels.extend(std::iter::repeat(false).take(300));
    levels.extend(std::iter::repeat(true).take(2));
    levels.push(false);
    levels
}

/// Waveform of an ASK message: one pulse per bit, MSB first, the longer
/// phase carrying the bit value.
pub fn ask_wave(bytes: &[u8], cycle: u8) -> Vec<bool> {
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
    wave(&pulses)
}

/// Appends pulses to the ring the way the sampler would, advancing the
/// write head past them.
pub fn inject<RX, TX, ANT>(bridge: &mut Bridge<RX, TX, ANT>, pulses: &[Pulse])
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    for &p in pulses {
        let head = bridge.ring.current;
        bridge.ring.set(head, p);
        bridge.ring.current = head.wrapping_add(1);
    }
    let head = bridge.ring.current;
    bridge.ring.clear_slot(head);
}

/// Ticks and polls the bridge in lockstep, like the ISR plus main loop.
pub fn run<RX, TX, ANT>(bridge: &mut Bridge<RX, TX, ANT>, iterations: usize)
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    for _ in 0..iterations {
        bridge.tick();
        bridge.poll();
    }
}

/// Polls without ticking, for ring-injected scenarios.
pub fn run_polls<RX, TX, ANT>(bridge: &mut Bridge<RX, TX, ANT>, iterations: usize)
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    for _ in 0..iterations {
        bridge.poll();
    }
}

/// Drains the serial output into a string.
pub fn drain<RX, TX, ANT>(bridge: &mut Bridge<RX, TX, ANT>) -> String
where
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    let mut out = String::new();
    while let Ok(b) = bridge.uart_take() {
        out.push(b as char);
    }
    out
}

/// Non-empty lines of a serial capture.
pub fn lines(capture: &str) -> Vec<String> {
    capture
        .split('\n')
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Recomputes the additive checksum law over an emitted line:
/// `0x55 + payload bytes + bit count + pulse duration`, mod 256.
pub fn law_checksum(line: &str) -> u8 {
    let colon = line.find(':').expect("no payload separator");
    let hash = line.find('#').expect("no bit count");
    let bang = line.find('!').expect("no pulse duration");
    let mut sum = 0x55u8;
    let payload = &line[colon + 1..hash];
    let mut i = 0;
    while i + 2 <= payload.len() {
        sum = sum.wrapping_add(u8::from_str_radix(&payload[i..i + 2], 16).expect("payload hex"));
        i += 2;
    }
    sum = sum.wrapping_add(u8::from_str_radix(&line[hash + 1..hash + 3], 16).expect("bit count"));
    sum = sum.wrapping_add(u8::from_str_radix(&line[bang + 1..bang + 3], 16).expect("duration"));
    sum
}
