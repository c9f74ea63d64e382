//! Linux board: gpiod character-device GPIO, i2c-dev and a tty serial port.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::Duration;

use embedded_hal::blocking::delay::{DelayMs, DelayUs};
use embedded_hal::blocking::i2c;
use gpiod::{Chip, Input, Lines, Options, Output};
use linux_embedded_hal::{Delay, I2cdev};
use log::debug;
use nix::time::{clock_gettime, ClockId};
use serialport::{ClearBuffer, SerialPort};

use crate::board::{Clock, DigitalIo, I2cBus, Level, PinMode, SerialFactory, SerialLink};
use crate::error::{Error, Result};

/// Where the board's devices live.
#[derive(Clone, Debug)]
pub struct BoardConfig {
    pub gpio_chip: String,
    /// Bus number, opened as `/dev/i2c-{bus}`
    pub i2c_bus: u8,
    pub serial_path: String,
    /// Consumer label shown for requested GPIO lines
    pub consumer: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            gpio_chip: "/dev/gpiochip0".to_string(),
            i2c_bus: 1,
            serial_path: "/dev/serial0".to_string(),
            consumer: "ultrasonic".to_string(),
        }
    }
}

enum Line {
    Output(Lines<Output>),
    Input(Lines<Input>),
}

pub struct LinuxBoard {
    config: BoardConfig,
    chip: Option<Chip>,
    lines: HashMap<u8, Line>,
    i2c: Option<I2cdev>,
    delay: Delay,
}

impl LinuxBoard {
    /// Devices are opened on first use, so a board for an I2C sensor never
    /// touches the GPIO chip.
    pub fn new(config: BoardConfig) -> Self {
        Self {
            config,
            chip: None,
            lines: HashMap::new(),
            i2c: None,
            delay: Delay,
        }
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    fn chip(&mut self) -> Result<&Chip> {
        let chip = match self.chip.take() {
            Some(chip) => chip,
            None => {
                debug!("opening {}", self.config.gpio_chip);
                Chip::new(&self.config.gpio_chip)?
            }
        };
        Ok(self.chip.insert(chip))
    }

    fn i2c(&mut self) -> Result<&mut I2cdev> {
        self.i2c.as_mut().ok_or(Error::NotStarted)
    }
}

impl Default for LinuxBoard {
    fn default() -> Self {
        Self::new(BoardConfig::default())
    }
}

fn monotonic_us() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as u64 * 1_000_000 + ts.tv_nsec() as u64 / 1_000,
        Err(_) => 0, // never expecting this
    }
}

impl Clock for LinuxBoard {
    fn millis(&self) -> u64 {
        monotonic_us() / 1_000
    }

    fn micros(&self) -> u64 {
        monotonic_us()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}

impl DigitalIo for LinuxBoard {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        // A line can only be requested once, drop the old request first
        self.lines.remove(&pin);

        let consumer = self.config.consumer.clone();
        let chip = self.chip()?;
        let offsets = [u32::from(pin)];
        let line = match mode {
            PinMode::Output => Line::Output(
                chip.request_lines(Options::output(offsets).values([false]).consumer(&consumer))?,
            ),
            PinMode::Input => {
                Line::Input(chip.request_lines(Options::input(offsets).consumer(&consumer))?)
            }
        };
        self.lines.insert(pin, line);
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()> {
        match self.lines.get_mut(&pin) {
            Some(Line::Output(lines)) => {
                lines.set_values([level.is_high()])?;
                Ok(())
            }
            _ => Err(Error::PinMode {
                pin,
                mode: PinMode::Output,
            }),
        }
    }

    fn digital_read(&mut self, pin: u8) -> Result<Level> {
        match self.lines.get_mut(&pin) {
            Some(Line::Input(lines)) => {
                let [high] = lines.get_values([false; 1])?;
                Ok(Level::from(high))
            }
            _ => Err(Error::PinMode {
                pin,
                mode: PinMode::Input,
            }),
        }
    }
}

impl I2cBus for LinuxBoard {
    fn i2c_begin(&mut self) -> Result<()> {
        if self.i2c.is_none() {
            let path = format!("/dev/i2c-{}", self.config.i2c_bus);
            debug!("opening {}", path);
            let dev = I2cdev::new(&path)
                .map_err(|e| Error::I2c(format!("Failed to open I2C bus {}: {}", path, e)))?;
            self.i2c = Some(dev);
        }
        Ok(())
    }

    fn i2c_write(&mut self, address: u8, bytes: &[u8]) -> Result<()> {
        i2c::Write::write(self.i2c()?, address, bytes)
            .map_err(|e| Error::I2c(format!("Failed to write to 0x{:02x}: {:?}", address, e)))
    }

    fn i2c_request(&mut self, address: u8, buf: &mut [u8]) -> Result<usize> {
        i2c::Read::read(self.i2c()?, address, buf)
            .map_err(|e| Error::I2c(format!("Failed to read from 0x{:02x}: {:?}", address, e)))?;
        Ok(buf.len())
    }
}

impl SerialFactory for LinuxBoard {
    type Serial = LinuxSerial;

    fn serial(&mut self, rx: u8, tx: u8) -> LinuxSerial {
        LinuxSerial {
            path: self.config.serial_path.clone(),
            rx,
            tx,
            port: None,
        }
    }
}

/// Serial port on a tty device. On Linux the UART pins are fixed by the
/// device tree; `rx` and `tx` are kept for reference only.
pub struct LinuxSerial {
    path: String,
    rx: u8,
    tx: u8,
    port: Option<Box<dyn SerialPort>>,
}

impl LinuxSerial {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn pins(&self) -> (u8, u8) {
        (self.rx, self.tx)
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(Error::NotStarted)
    }
}

fn serial_err(e: impl std::fmt::Display) -> Error {
    Error::Serial(e.to_string())
}

impl SerialLink for LinuxSerial {
    fn begin(&mut self, baud: u32) -> Result<()> {
        debug!("opening {} at {} baud", self.path, baud);
        let port = serialport::new(&self.path, baud)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| Error::Serial(format!("open failed: {e}")))?;
        self.port = Some(port);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let port = self.port()?;
        port.clear(ClearBuffer::Input).map_err(serial_err)?;
        port.flush().map_err(serial_err)
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        self.port()?.write_all(&[byte]).map_err(serial_err)
    }

    fn available(&mut self) -> Result<usize> {
        let n = self.port()?.bytes_to_read().map_err(serial_err)?;
        Ok(n as usize)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.port()?.read_exact(&mut buf).map_err(serial_err)?;
        Ok(buf[0])
    }
}
