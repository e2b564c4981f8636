/// Declares a static global `RF_BRIDGE` instance protected by a
/// `critical_section` mutex.
///
/// This creates the `static` singleton used in interrupt-based
/// environments, where the timer ISR, the UART ISRs and the main loop all
/// need access to the shared driver state.
///
/// # Arguments
/// - `$rx`: the concrete type of the receiver pin (must implement `InputPin`)
/// - `$tx`: the concrete type of the transmitter pin (must implement `OutputPin`)
/// - `$ant`: the concrete type of the antenna switch pin (must implement `OutputPin`)
///
/// # Example
/// ```ignore
/// init_bridge!(MyRxPinType, MyTxPinType, MyAntennaPinType);
/// ```
#[macro_export]
macro_rules! init_bridge {
    ( $rx:ty, $tx:ty, $ant:ty ) => {
        pub static RF_BRIDGE: $crate::timer::GlobalBridge<$rx, $tx, $ant> =
            $crate::timer::global_bridge_init::<$rx, $tx, $ant>();
    };
}

/// Builds and starts the bridge inside the `RF_BRIDGE` singleton declared
/// by [`init_bridge!`].
///
/// # Example
/// ```ignore
/// fn main() {
///     setup_bridge!(rx, tx, Some(ant));
/// }
/// ```
#[macro_export]
macro_rules! setup_bridge {
    ( $rx:expr, $tx:expr, $ant:expr ) => {
        $crate::timer::global_bridge_setup(&RF_BRIDGE, $rx, $tx, $ant)
    };
}

/// Calls `tick()` on the global bridge if it has been set up. Invoke from
/// the timer compare ISR.
///
/// # Example
/// ```ignore
/// #[interrupt]
/// fn TIM2() {
///     tick_bridge!();
/// }
/// ```
#[macro_export]
macro_rules! tick_bridge {
    () => {
        $crate::timer::global_bridge_tick(&RF_BRIDGE)
    };
}

/// Runs one main-loop dispatch on the global bridge. Invoke after every
/// wakeup.
#[macro_export]
macro_rules! poll_bridge {
    () => {
        $crate::timer::global_bridge_poll(&RF_BRIDGE)
    };
}

/// Feeds an inbound serial byte to the global bridge. Invoke from the UART
/// RX ISR.
#[macro_export]
macro_rules! feed_bridge {
    ( $byte:expr ) => {
        $crate::timer::global_bridge_feed(&RF_BRIDGE, $byte)
    };
}

/// Takes the next outbound serial byte from the global bridge, as an
/// `Option<u8>`. Invoke from the UART TX-empty ISR.
#[macro_export]
macro_rules! take_bridge {
    () => {
        $crate::timer::global_bridge_take(&RF_BRIDGE)
    };
}
