//! Constants used across the bridge.
//!
//! This module defines the engine tunables: capture-buffer geometry, the
//! glitch filter, sync-search thresholds, decoder lock-in lengths and the
//! serial protocol's fixed values.
//!
//! Everything is sized for 8-bit arithmetic. Cursors into the pulse buffer
//! are plain `u8`s whose natural overflow replaces bounds checks, so the
//! buffer length is fixed at 256 and all cursor distances are computed with
//! wrap-around subtraction (see [`crate::ring::ovf_sub`]).

/// Number of pulse slots in the capture buffer. Fixed: cursor arithmetic
/// relies on `u8` overflow.
pub const RING_LEN: usize = 256;

/// Tick count at which a phase measurement pegs. A low phase that reaches
/// this value doubles as the end-of-message marker, so widening the counter
/// without redesigning the terminator would break framing.
pub const MAX_TICKS_PER_PHASE: u8 = 255;

/// Pulses where neither phase exceeds this many ticks are treated as spikes
/// and folded into the surrounding pulse.
pub const GLITCH_TICKS: u8 = 20;

/// Consecutive matching cycles required before the searcher trusts a train.
pub const SYNC_LEN: u8 = 8;

/// Cycle-to-cycle duration slack during sync search and ASK lock-in.
pub const SYNC_TOLERANCE: u8 = 8;

/// Cycles shorter than this are never a usable bit period.
pub const MIN_CYCLE_TICKS: u16 = 0x20;

/// A locked sync duration above this classifies the train as OOK.
pub const OOK_MIN_CYCLE: u8 = 0x80;

/// More than this many near-symmetric cycles out of [`SYNC_LEN`] classifies
/// the train as Manchester.
pub const MANCHESTER_MIN_HITS: u8 = 4;

/// Valid pulses required before the ASK decoder commits to emitting.
pub const ASK_LOCK_IN: u8 = 20;

/// Valid pulses required before the OOK decoder commits to emitting.
pub const OOK_LOCK_IN: u8 = 20;

/// Valid pulses required before the Manchester decoder commits. Stricter,
/// since Manchester has twice the edge density.
pub const MANCHESTER_LOCK_IN: u8 = 32;

/// Overrun guard for the Manchester decoder.
pub const MANCHESTER_MAX_BITS: u8 = 0xd0;

/// Seed of the additive line checksum.
pub const CHECKSUM_SEED: u8 = 0x55;

/// Default ASK bit duration seeded by an inbound `MA` command, in ticks.
pub const DEFAULT_ASK_CYCLE: u8 = 0x63;

/// Default Manchester clock (times two) seeded by an inbound `MM` command.
pub const DEFAULT_MANCHESTER_CYCLE: u8 = 0x40;

/// Commands expanding to this many pulses or fewer are not worth keying the
/// transmitter for.
pub const MIN_TRANSMIT_PULSES: u8 = 16;

/// Times a triggered message is replayed over the air.
pub const TRANSMIT_REPEATS: u8 = 3;

/// Ticks of serial silence inside a command before the parser gives up.
pub const RECV_TIMEOUT_TICKS: u16 = 1000;

/// Capacity of the host-to-bridge serial FIFO.
pub const SERIAL_RX_CAP: usize = 64;

/// Capacity of the bridge-to-host serial FIFO. Sized for a full raw-pulse
/// dump (256 pulses, four hex digits each) plus the trailer.
pub const SERIAL_TX_CAP: usize = 1088;
