//! Hardware capabilities consumed by the distance sensor.
//!
//! A board is anything that can drive pins by id, talk on an I2C bus, hand
//! out serial ports and tell the time. [`crate::linux::LinuxBoard`] is the
//! implementation used on a Raspberry Pi; tests use a simulated board.

use crate::error::Result;

/// Direction of a digital pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// Logic level of a digital pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }
}

/// Monotonic time source plus blocking delays.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed point.
    fn millis(&self) -> u64;
    /// Microseconds since the same fixed point as [`Clock::millis`].
    fn micros(&self) -> u64;
    fn delay_ms(&mut self, ms: u32);
    fn delay_us(&mut self, us: u32);
}

/// Digital pins addressed by id.
pub trait DigitalIo {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()>;
    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()>;
    fn digital_read(&mut self, pin: u8) -> Result<Level>;
}

/// Master side of an I2C bus.
pub trait I2cBus {
    /// Bring up the bus controller.
    fn i2c_begin(&mut self) -> Result<()>;

    fn i2c_write(&mut self, address: u8, bytes: &[u8]) -> Result<()>;

    /// Request `buf.len()` bytes from `address`.
    ///
    /// Received bytes are written to the front of `buf` and their count is
    /// returned. Slots past the count are left untouched.
    fn i2c_request(&mut self, address: u8, buf: &mut [u8]) -> Result<usize>;
}

/// A byte-oriented serial port.
pub trait SerialLink {
    /// Open the port at `baud`.
    fn begin(&mut self, baud: u32) -> Result<()>;
    /// Discard pending input and wait for queued output to drain.
    fn flush(&mut self) -> Result<()>;
    fn write_byte(&mut self, byte: u8) -> Result<()>;
    /// Number of received bytes ready to read.
    fn available(&mut self) -> Result<usize>;
    fn read_byte(&mut self) -> Result<u8>;
}

/// Hands out serial port handles bound to a pair of pins.
pub trait SerialFactory {
    type Serial: SerialLink;

    /// Allocate a handle for the port on `rx`/`tx`. The port is not opened
    /// until [`SerialLink::begin`].
    fn serial(&mut self, rx: u8, tx: u8) -> Self::Serial;
}

/// Everything a [`crate::DistanceSensor`] needs from the hardware.
pub trait Board: Clock + DigitalIo + I2cBus + SerialFactory {}

impl<T> Board for T where T: Clock + DigitalIo + I2cBus + SerialFactory {}
