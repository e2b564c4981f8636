//! Timer and tick-loop utilities for the bridge.
//!
//! The tick is the unit of every pulse measurement, so picking the rate is
//! the one piece of board bring-up this crate cares about: tune it so the
//! bit period of the transmitters you want to hear lands around 0x40..0x80
//! ticks. Two scheduling approaches are supported: an interrupt service
//! routine using `critical_section::with` (`timer-isr` feature), or a
//! busy-loop delay timer (`delayus-loop` feature).
//!
//! Contains helpers for ISR- and polling-based scheduling, including:
//! - `compute_ocr_value`: runtime OCR calculator
//! - `const_ocr_value`: compile-time OCR calculator
//! - `ticks_for` / `const_ticks_for`: pulse-duration to tick conversion
//! - `run_bridge_loop` / `bridge_step`: blocking drivers (feature
//!   `delayus-loop`)
//! - `global_bridge_tick` and friends: interrupt plumbing (feature
//!   `timer-isr`)
//!
//! Common prescalers: (For use with `compute_ocr_value` and
//! `const_ocr_value`)
//!
//! | PRESCALER | TIMER_COUNTS | Overflow Interval |
//! |-----------|--------------|-------------------|
//! |         8 |           32 |             16 µs |
//! |        64 |            8 |             32 µs |
//! |        64 |           16 |             64 µs |
//! |       256 |            8 |            128 µs |

use libm::round;

#[cfg(feature = "delayus-loop")]
mod delay;
#[cfg_attr(feature = "delayus-loop", allow(unused_imports))]
#[cfg(feature = "delayus-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;
#[cfg_attr(feature = "timer-isr", allow(unused_imports))]
#[cfg(feature = "timer-isr")]
pub use macros::*;

/// 1,000,000,000 nanoseconds = 1 second
pub const NANOSECONDS_PER_SECOND: u64 = 1_000_000_000;

/// Computes the OCR value for a CTC-mode timer.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 8, 64, 256)
/// - `tick_us`: desired tick interval in microseconds (e.g., 16.0)
///
/// # Returns
/// - OCR value for the compare register (rounds to nearest integer)
pub fn compute_ocr_value(f_cpu: u32, prescaler: u32, tick_us: f32) -> u16 {
    let ticks_per_second = f_cpu as f32 / prescaler as f32;
    let counts = ticks_per_second * (tick_us / 1_000_000.0);
    round(counts as f64) as u16
}

/// Compile-time OCR value calculator.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 8, 64, 256)
/// - `tick_ns`: desired tick interval in nanoseconds (e.g., 16_000)
///
/// # Returns
/// - OCR value for the compare register (truncates)
pub const fn const_ocr_value(f_cpu: u32, prescaler: u32, tick_ns: u32) -> u16 {
    let counts = (f_cpu / prescaler) as u64 * tick_ns as u64 / NANOSECONDS_PER_SECOND;
    counts as u16
}

/// Converts a pulse duration into ticks at the given tick interval,
/// pegging at 255 the way the sampler does.
///
/// # Arguments
/// - `tick_us`: tick interval in microseconds
/// - `duration_us`: pulse phase duration in microseconds
pub fn ticks_for(tick_us: f32, duration_us: f32) -> u8 {
    let ticks = round((duration_us / tick_us) as f64);
    if ticks >= 255.0 {
        255
    } else if ticks <= 0.0 {
        0
    } else {
        ticks as u8
    }
}

/// Compile-time version of [`ticks_for`], in nanoseconds.
pub const fn const_ticks_for(tick_ns: u32, duration_ns: u32) -> u8 {
    let ticks = duration_ns / tick_ns;
    if ticks >= 255 {
        255
    } else {
        ticks as u8
    }
}
