//! # bridge433
//!
//! A portable, no_std Rust driver that turns a cheap ASK/OOK 433 MHz
//! transceiver pair into a pulse-level RF bridge for a serial host.
//!
//! The driver keeps a free-running capture of the receiver pin as a circular
//! buffer of pulse-duration pairs, notices when the pulse trail stops being
//! noise, classifies the modulation (ASK, OOK or Manchester) and decodes the
//! message on the fly, emitting it over the serial link as a line of hex with
//! a trailer carrying the bit count, the nominal pulse duration and an
//! additive checksum. The same line format is accepted back as a command and
//! replayed through the transmitter, so a host can record and resend remote
//! controls, sensor frames and the like.
//!
//! This driver implements the bridge using:
//! - `embedded-hal` traits for digital I/O
//! - cooperative decoder tasks stepped from the main loop, yielding via `nb`
//! - interrupt-safe global access with `critical-section`
//! - optional tick sources using either timer interrupts or blocking delay
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` support |
//! | `delayus-loop`        | Uses `embedded_hal::delay::DelayNs` for tick timing |
//! | `timer-isr` (default) | Uses `critical_section::with` for tick timing |
//! | `defmt`               | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Usage
//!
//! ```ignore
//! use bridge433::driver::Bridge;
//!
//! let mut bridge = Bridge::new(rx_pin, tx_pin, Some(antenna_pin));
//! bridge.start();
//! loop {
//!     bridge.tick(); // from the timer ISR, at the sampling rate
//!     bridge.poll(); // from the main loop, after any interrupt
//! }
//! ```
//!
//! Bytes from the host UART go in through [`driver::Bridge::uart_feed`];
//! bytes for the host come back out of [`driver::Bridge::uart_take`].
//!
//! ## Integration Notes
//!
//! - The tick rate sets the unit of every pulse measurement; pick it so the
//!   bit period of the remotes you care about lands around 0x40..0x80 ticks
//!   (see [`timer::compute_ocr_value`]).
//! - Only one bridge instance should be active at a time in interrupt-driven
//!   mode.
//! - The capture buffer holds 256 pulses; a decoder that lags the sampler by
//!   more than that silently loses data and re-synchronizes on the next
//!   train.
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded environments.

#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    while_true
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(test)]
extern crate std;

pub use critical_section;
pub use heapless;
pub use nb;

#[macro_use]
mod fmt;

pub mod command;
pub mod consts;
pub mod decode;
pub mod driver;
pub mod ring;
pub mod sync;
pub mod timer;

#[cfg(test)]
pub(crate) mod testutil;
