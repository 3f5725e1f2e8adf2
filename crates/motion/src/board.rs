pub use embedded_hal::digital::v2::PinState;

/// A numbered output on the controller board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Pin(pub u8);

/// Everything the motion core needs from the hardware.
///
/// The channels only ever write pins and read the clocks, so a test double
/// that records writes and advances a fake clock is enough to run the whole
/// machine deterministically.
pub trait Board {
    fn write_digital(&mut self, pin: Pin, state: PinState);

    /// Commands a hobby servo on `pin` to `degrees`, which is already clamped to `[0, 180]`.
    fn write_servo(&mut self, pin: Pin, degrees: u8);

    /// Stops driving the servo on `pin`.
    fn release_servo(&mut self, _pin: Pin) {}

    /// A free-running microsecond counter. It wraps.
    fn now_us(&self) -> u32;

    /// A free-running millisecond counter. It wraps.
    fn now_ms(&self) -> u32;
}

impl<B: Board + ?Sized> Board for &mut B {
    fn write_digital(&mut self, pin: Pin, state: PinState) {
        (**self).write_digital(pin, state)
    }

    fn write_servo(&mut self, pin: Pin, degrees: u8) {
        (**self).write_servo(pin, degrees)
    }

    fn release_servo(&mut self, pin: Pin) {
        (**self).release_servo(pin)
    }

    fn now_us(&self) -> u32 {
        (**self).now_us()
    }

    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}
