use crate::driver::Bridge;
use core::cell::RefCell;
use critical_section::Mutex;
use embedded_hal::digital::{InputPin, OutputPin};

/// The shared-instance type used by interrupt-driven targets.
pub type GlobalBridge<RX, TX, ANT> = Mutex<RefCell<Option<Bridge<RX, TX, ANT>>>>;

/// Declares the global static bridge for use with `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```ignore
/// static RF_BRIDGE: GlobalBridge<PD2, PD1, PB0> = global_bridge_init::<PD2, PD1, PB0>();
/// ```
pub const fn global_bridge_init<RX: InputPin, TX: OutputPin, ANT: OutputPin>(
) -> GlobalBridge<RX, TX, ANT> {
    Mutex::new(RefCell::new(None))
}

/// Builds the bridge inside its global slot and starts it.
///
/// # Arguments
/// * The global static bridge
/// * The receiver pin
/// * The transmitter pin
/// * The optional antenna switch pin
///
/// # Example
/// ```ignore
/// fn main() {
///     global_bridge_setup(&RF_BRIDGE, rx, tx, Some(ant));
/// }
/// ```
pub fn global_bridge_setup<RX: InputPin, TX: OutputPin, ANT: OutputPin>(
    global_bridge: &'static GlobalBridge<RX, TX, ANT>,
    rx: RX,
    tx: TX,
    antenna: Option<ANT>,
) {
    critical_section::with(|cs| {
        let mut bridge = Bridge::new(rx, tx, antenna);
        bridge.start();
        let _ = global_bridge.borrow(cs).replace(Some(bridge));
    });
}

/// Advances the bridge by one tick. Call from the timer compare ISR.
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn TIMER0_COMPA() {
///     global_bridge_tick(&RF_BRIDGE);
/// }
/// ```
pub fn global_bridge_tick<RX: InputPin, TX: OutputPin, ANT: OutputPin>(
    global_bridge: &'static GlobalBridge<RX, TX, ANT>,
) {
    critical_section::with(|cs| {
        if let Some(bridge) = global_bridge.borrow(cs).borrow_mut().as_mut() {
            bridge.tick();
        }
    });
}

/// Runs one main-loop dispatch. Call after waking from sleep.
pub fn global_bridge_poll<RX: InputPin, TX: OutputPin, ANT: OutputPin>(
    global_bridge: &'static GlobalBridge<RX, TX, ANT>,
) {
    critical_section::with(|cs| {
        if let Some(bridge) = global_bridge.borrow(cs).borrow_mut().as_mut() {
            bridge.poll();
        }
    });
}

/// Hands one inbound serial byte to the bridge. Call from the UART RX ISR.
pub fn global_bridge_feed<RX: InputPin, TX: OutputPin, ANT: OutputPin>(
    global_bridge: &'static GlobalBridge<RX, TX, ANT>,
    byte: u8,
) {
    critical_section::with(|cs| {
        if let Some(bridge) = global_bridge.borrow(cs).borrow_mut().as_mut() {
            bridge.uart_feed(byte);
        }
    });
}

/// Takes the next outbound serial byte, if any. Call from the UART TX-empty
/// ISR.
pub fn global_bridge_take<RX: InputPin, TX: OutputPin, ANT: OutputPin>(
    global_bridge: &'static GlobalBridge<RX, TX, ANT>,
) -> Option<u8> {
    critical_section::with(|cs| {
        global_bridge
            .borrow(cs)
            .borrow_mut()
            .as_mut()
            .and_then(|bridge| bridge.uart_take().ok())
    })
}
