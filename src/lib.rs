//! Ultrasonic distance sensor driver.
//!
//! One [`DistanceSensor`] type covers four wirings of the same kind of
//! sensor: separate trigger/echo GPIO pins, a single shared pin, an I2C
//! register read and a UART command/reply. Whatever the wiring,
//! [`DistanceSensor::get_distance`] returns centimeters.
//!
//! The sensor talks to hardware through the [`Board`] traits.
//! [`LinuxBoard`] implements them with gpiod, i2c-dev and a tty. With the
//! `python` feature the crate also builds as the `ultrasonic` Python module.

pub mod board;
pub mod error;
pub mod linux;
pub mod pulse;
pub mod sensor;

#[cfg(test)]
mod mock;
#[cfg(feature = "python")]
mod python;

pub use board::{Board, Clock, DigitalIo, I2cBus, Level, PinMode, SerialFactory, SerialLink};
pub use error::{Error, Result};
pub use linux::{BoardConfig, LinuxBoard, LinuxSerial};
pub use pulse::pulse_in;
pub use sensor::{
    echo_to_cm, frame_to_cm, one_wire_to_cm, DistanceSensor, Measurement, RawReading,
    SensorConfig, Timing,
};
