use crate::driver::Bridge;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// One blocking iteration of the bridge: tick, poll, wait out the interval.
///
/// Split out of [`run_bridge_loop`] so firmware that has other work to do
/// per iteration (and tests) can drive the cadence itself.
pub fn bridge_step<D, RX, TX, ANT>(bridge: &mut Bridge<RX, TX, ANT>, delay: &mut D, tick_us: u32)
where
    D: DelayNs,
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    bridge.tick();
    bridge.poll();
    delay.delay_us(tick_us);
}

/// Runs the bridge forever with a blocking delay as the tick source.
///
/// This is for environments where interrupts are unavailable or undesired.
/// Timing jitter from the poll work directly skews pulse measurements, so
/// prefer interrupt-driven ticks (`timer-isr`) when the hardware allows it.
///
/// # Arguments
/// - `bridge`: the bridge instance; started here if the caller hasn't
/// - `delay`: a delay provider implementing `DelayNs`, typically from the HAL
/// - `tick_us`: the tick interval in microseconds
pub fn run_bridge_loop<D, RX, TX, ANT>(
    bridge: &mut Bridge<RX, TX, ANT>,
    delay: &mut D,
    tick_us: u32,
) -> !
where
    D: DelayNs,
    RX: InputPin,
    TX: OutputPin,
    ANT: OutputPin,
{
    bridge.start();
    loop {
        bridge_step(bridge, delay, tick_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal_mock::eh1::delay::NoopDelay as MockDelay;
    use embedded_hal_mock::eh1::digital::{
        Mock as PinMock, State as PinState, Transaction as PinTransaction,
    };

    #[test]
    fn bridge_step_ticks_once() {
        let tx = PinMock::new(&[PinTransaction::set(PinState::Low)]);
        let rx = PinMock::new(&[]);
        let mut bridge: Bridge<PinMock, PinMock, PinMock> = Bridge::new(rx, tx, None);
        let mut delay = MockDelay::new();

        bridge_step(&mut bridge, &mut delay, 16);

        bridge.tx.done();
        bridge.rx.done();
    }
}
