//! Ultrasonic distance sensor reachable over one of four transports.
//!
//! The transport is picked by the constructor and never changes. GPIO and
//! single-wire sensors report distance as the width of an echo pulse; I2C
//! and UART sensors answer a command byte with a 3-byte big-endian
//! micrometer count.

use std::time::Duration;

use log::{debug, trace, warn};

use crate::board::{Board, Level, PinMode, SerialLink};
use crate::error::Result;
use crate::pulse::pulse_in;

const I2C_COMMAND: u8 = 0x01;
const UART_COMMAND: u8 = 0xA0;
const FRAME_LEN: usize = 3;

/// Timing knobs of the measurement protocols.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    /// Reads closer together than this are delayed
    pub min_read_interval: Duration,
    /// Length of the trigger pulse on GPIO and single-wire sensors
    pub trigger_pulse: Duration,
    /// Wait between the command byte and the reply on I2C and UART sensors
    pub conversion_wait: Duration,
    pub baud_rate: u32,
    /// Give up on an echo after this long and report 0 cm. `None` waits forever.
    pub echo_timeout: Option<Duration>,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            min_read_interval: Duration::from_millis(30),
            trigger_pulse: Duration::from_micros(500),
            conversion_wait: Duration::from_millis(150),
            baud_rate: 9600,
            echo_timeout: Some(Duration::from_secs(1)),
        }
    }
}

/// Which transport a sensor uses, and where it is attached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorConfig {
    Gpio { trigger_pin: u8, echo_pin: u8 },
    I2c { address: u8 },
    Uart { rx_pin: u8, tx_pin: u8 },
    OneWire { pin: u8 },
}

/// What the sensor actually reported, before unit conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawReading {
    /// Echo pulse width in microseconds, 0 on timeout
    Echo { duration_us: u32 },
    /// Response buffer and how many of its bytes arrived this time
    Frame { bytes: [u8; FRAME_LEN], received: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    pub distance_cm: f32,
    pub raw: RawReading,
    /// False when the echo timed out or the reply was short. A short reply
    /// still decodes, using whatever the response buffer held before.
    pub complete: bool,
}

enum Transport<S> {
    Gpio {
        trigger: u8,
        echo: u8,
    },
    I2c {
        address: u8,
        response: [u8; FRAME_LEN],
    },
    Uart {
        rx: u8,
        tx: u8,
        port: S,
        response: [u8; FRAME_LEN],
    },
    OneWire {
        pin: u8,
    },
}

pub struct DistanceSensor<B: Board> {
    board: B,
    transport: Transport<B::Serial>,
    timing: Timing,
    last_read_us: Option<u64>,
}

impl<B: Board> DistanceSensor<B> {
    fn with_transport(board: B, transport: Transport<B::Serial>) -> Self {
        Self {
            board,
            transport,
            timing: Timing::default(),
            last_read_us: None,
        }
    }

    /// Sensor with separate trigger and echo pins.
    pub fn gpio(board: B, trigger_pin: u8, echo_pin: u8) -> Self {
        Self::with_transport(
            board,
            Transport::Gpio {
                trigger: trigger_pin,
                echo: echo_pin,
            },
        )
    }

    /// Sensor on the I2C bus at `address`.
    pub fn i2c(board: B, address: u8) -> Self {
        Self::with_transport(
            board,
            Transport::I2c {
                address,
                response: [0; FRAME_LEN],
            },
        )
    }

    /// Sensor on a serial port. The port handle is allocated here and owned
    /// by the sensor until it is dropped.
    pub fn uart(mut board: B, rx_pin: u8, tx_pin: u8) -> Self {
        let port = board.serial(rx_pin, tx_pin);
        Self::with_transport(
            board,
            Transport::Uart {
                rx: rx_pin,
                tx: tx_pin,
                port,
                response: [0; FRAME_LEN],
            },
        )
    }

    /// Sensor sharing one pin for trigger and echo.
    pub fn one_wire(board: B, pin: u8) -> Self {
        Self::with_transport(board, Transport::OneWire { pin })
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn config(&self) -> SensorConfig {
        match &self.transport {
            Transport::Gpio { trigger, echo } => SensorConfig::Gpio {
                trigger_pin: *trigger,
                echo_pin: *echo,
            },
            Transport::I2c { address, .. } => SensorConfig::I2c { address: *address },
            Transport::Uart { rx, tx, .. } => SensorConfig::Uart {
                rx_pin: *rx,
                tx_pin: *tx,
            },
            Transport::OneWire { pin } => SensorConfig::OneWire { pin: *pin },
        }
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    /// Give the board back. A UART port handle is closed here.
    pub fn release(self) -> B {
        self.board
    }

    /// Prepare the transport: pin directions, bus controller or serial port.
    pub fn begin(&mut self) -> Result<()> {
        debug!("begin {:?}", self.config());
        let board = &mut self.board;
        match &mut self.transport {
            Transport::Gpio { trigger, echo } => {
                board.pin_mode(*trigger, PinMode::Output)?;
                board.pin_mode(*echo, PinMode::Input)?;
            }
            Transport::I2c { .. } => board.i2c_begin()?,
            Transport::Uart { port, .. } => port.begin(self.timing.baud_rate)?,
            Transport::OneWire { pin } => board.pin_mode(*pin, PinMode::Output)?,
        }
        Ok(())
    }

    /// Distance in centimeters.
    ///
    /// Never fails: a measurement error is logged and reported as 0 cm, the
    /// same value an absent sensor produces. Use [`DistanceSensor::measure`]
    /// to see errors and short replies.
    pub fn get_distance(&mut self) -> f32 {
        match self.measure() {
            Ok(measurement) => measurement.distance_cm,
            Err(e) => {
                warn!("distance read failed on {:?}: {}", self.config(), e);
                0.0
            }
        }
    }

    /// Take one measurement, waiting first if the previous one was less
    /// than [`Timing::min_read_interval`] ago.
    pub fn measure(&mut self) -> Result<Measurement> {
        self.throttle();

        let timing = self.timing;
        let board = &mut self.board;
        let measurement = match &mut self.transport {
            Transport::Gpio { trigger, echo } => read_gpio(board, *trigger, *echo, &timing)?,
            Transport::I2c { address, response } => {
                read_i2c(board, *address, response, &timing)?
            }
            Transport::Uart { port, response, .. } => read_uart(board, port, response, &timing)?,
            Transport::OneWire { pin } => read_one_wire(board, *pin, &timing)?,
        };

        if !measurement.complete {
            warn!("incomplete reading {:?}", measurement.raw);
        }
        Ok(measurement)
    }

    fn throttle(&mut self) {
        if let Some(last) = self.last_read_us {
            let min = u64::try_from(self.timing.min_read_interval.as_micros()).unwrap_or(u64::MAX);
            let elapsed = self.board.micros().saturating_sub(last);
            if elapsed < min {
                self.board.delay_us(saturate(min - elapsed));
            }
        }
        self.last_read_us = Some(self.board.micros());
    }
}

fn saturate(value: impl TryInto<u32>) -> u32 {
    value.try_into().unwrap_or(u32::MAX)
}

/// Centimeters from a GPIO echo pulse width.
pub fn echo_to_cm(duration_us: u32) -> f32 {
    (duration_us as f32 / 2.0) * 0.0343
}

/// Centimeters from a single-wire echo pulse width.
pub fn one_wire_to_cm(duration_us: u32) -> f32 {
    duration_us as f32 * 340.0 / 2.0 / 10000.0
}

/// Centimeters from a big-endian micrometer frame.
pub fn frame_to_cm(frame: [u8; FRAME_LEN]) -> f32 {
    let micrometers =
        u32::from(frame[0]) * 65536 + u32::from(frame[1]) * 256 + u32::from(frame[2]);
    micrometers as f32 / 1_000_000.0 * 100.0
}

fn fire_trigger<B: Board>(board: &mut B, pin: u8, timing: &Timing) -> Result<()> {
    board.digital_write(pin, Level::High)?;
    board.delay_us(saturate(timing.trigger_pulse.as_micros()));
    board.digital_write(pin, Level::Low)
}

fn echo_reading(duration_us: u32, distance_cm: f32) -> Measurement {
    Measurement {
        distance_cm,
        raw: RawReading::Echo { duration_us },
        complete: duration_us != 0,
    }
}

fn frame_reading(bytes: [u8; FRAME_LEN], received: usize) -> Measurement {
    Measurement {
        distance_cm: frame_to_cm(bytes),
        raw: RawReading::Frame { bytes, received },
        complete: received == FRAME_LEN,
    }
}

fn read_gpio<B: Board>(
    board: &mut B,
    trigger: u8,
    echo: u8,
    timing: &Timing,
) -> Result<Measurement> {
    fire_trigger(board, trigger, timing)?;
    let duration = pulse_in(board, echo, Level::High, timing.echo_timeout)?;
    trace!("echo {} us on pin {}", duration, echo);
    Ok(echo_reading(duration, echo_to_cm(duration)))
}

fn read_i2c<B: Board>(
    board: &mut B,
    address: u8,
    response: &mut [u8; FRAME_LEN],
    timing: &Timing,
) -> Result<Measurement> {
    board.i2c_write(address, &[I2C_COMMAND])?;
    board.delay_ms(saturate(timing.conversion_wait.as_millis()));

    let received = board.i2c_request(address, response)?.min(FRAME_LEN);
    trace!("i2c 0x{:02x} replied {:02x?} ({} new)", address, response, received);
    Ok(frame_reading(*response, received))
}

fn read_uart<B: Board>(
    board: &mut B,
    port: &mut B::Serial,
    response: &mut [u8; FRAME_LEN],
    timing: &Timing,
) -> Result<Measurement> {
    port.flush()?;
    port.write_byte(UART_COMMAND)?;
    board.delay_ms(saturate(timing.conversion_wait.as_millis()));

    let mut received = 0;
    while received < FRAME_LEN && port.available()? > 0 {
        response[received] = port.read_byte()?;
        received += 1;
    }
    trace!("uart replied {:02x?} ({} new)", response, received);
    Ok(frame_reading(*response, received))
}

fn read_one_wire<B: Board>(board: &mut B, pin: u8, timing: &Timing) -> Result<Measurement> {
    board.pin_mode(pin, PinMode::Output)?;
    fire_trigger(board, pin, timing)?;
    board.pin_mode(pin, PinMode::Input)?;
    let duration = pulse_in(board, pin, Level::High, timing.echo_timeout)?;
    trace!("single-wire echo {} us on pin {}", duration, pin);
    Ok(echo_reading(duration, one_wire_to_cm(duration)))
}
