//! Simulated board for unit tests.
//!
//! Time only moves when the code under test waits: delays advance the clock
//! by their length and every `digital_read` costs one microsecond, so pulse
//! measurements come out exact.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::board::{Clock, DigitalIo, I2cBus, Level, PinMode, SerialFactory, SerialLink};
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Mode { pin: u8, mode: PinMode, at_us: u64 },
    Write { pin: u8, level: Level, at_us: u64 },
    I2cBegin,
    I2cWrite { address: u8, bytes: Vec<u8>, at_us: u64 },
    I2cRequest { address: u8, len: usize, at_us: u64 },
}

/// Echo produced after each falling edge on `trigger`.
struct EchoScript {
    trigger: u8,
    echo: u8,
    delay_us: u64,
    width_us: u64,
}

pub struct MockBoard {
    now_us: Arc<AtomicU64>,
    modes: HashMap<u8, PinMode>,
    driven: HashMap<u8, Level>,
    pulses: Vec<(u8, u64, u64)>,
    echo: Option<EchoScript>,
    i2c_replies: VecDeque<Vec<u8>>,
    serial: Arc<Mutex<SerialState>>,
    pub events: Vec<Event>,
    /// rx/tx of every serial handle handed out
    pub serial_pins: Vec<(u8, u8)>,
}

impl Default for MockBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            // Start well away from zero so "last read" arithmetic is exercised
            now_us: Arc::new(AtomicU64::new(5_000_000)),
            modes: HashMap::new(),
            driven: HashMap::new(),
            pulses: Vec::new(),
            echo: None,
            i2c_replies: VecDeque::new(),
            serial: Arc::new(Mutex::new(SerialState::default())),
            events: Vec::new(),
            serial_pins: Vec::new(),
        }
    }

    /// Pin `pin` reads high during `[start_us, start_us + width_us)`.
    pub fn schedule_pulse(&mut self, pin: u8, start_us: u64, width_us: u64) {
        self.pulses.push((pin, start_us, start_us + width_us));
    }

    /// Answer every trigger pulse on `trigger` with an echo on `echo`.
    pub fn with_echo(mut self, trigger: u8, echo: u8, delay_us: u64, width_us: u64) -> Self {
        self.echo = Some(EchoScript {
            trigger,
            echo,
            delay_us,
            width_us,
        });
        self
    }

    /// Queue the bytes returned by the next I2C request.
    pub fn push_i2c_reply(&mut self, bytes: &[u8]) {
        self.i2c_replies.push_back(bytes.to_vec());
    }

    pub fn serial_state(&self) -> Arc<Mutex<SerialState>> {
        Arc::clone(&self.serial)
    }

    pub fn advance_us(&mut self, us: u64) {
        self.advance(us);
    }

    fn now(&self) -> u64 {
        self.now_us.load(Ordering::Relaxed)
    }

    fn advance(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::Relaxed);
    }

    /// Times at which `pin` was driven to `level`.
    pub fn writes(&self, pin: u8, level: Level) -> Vec<u64> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Write {
                    pin: p,
                    level: l,
                    at_us,
                } if *p == pin && *l == level => Some(*at_us),
                _ => None,
            })
            .collect()
    }

    pub fn mode_of(&self, pin: u8) -> Option<PinMode> {
        self.modes.get(&pin).copied()
    }
}

impl Clock for MockBoard {
    fn millis(&self) -> u64 {
        self.now() / 1000
    }

    fn micros(&self) -> u64 {
        self.now()
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance(u64::from(ms) * 1000);
    }

    fn delay_us(&mut self, us: u32) {
        self.advance(u64::from(us));
    }
}

impl DigitalIo for MockBoard {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> Result<()> {
        self.modes.insert(pin, mode);
        self.events.push(Event::Mode {
            pin,
            mode,
            at_us: self.now(),
        });
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, level: Level) -> Result<()> {
        if self.mode_of(pin) != Some(PinMode::Output) {
            return Err(Error::PinMode {
                pin,
                mode: PinMode::Output,
            });
        }
        let previous = self.driven.insert(pin, level);
        self.events.push(Event::Write {
            pin,
            level,
            at_us: self.now(),
        });

        let falling = previous == Some(Level::High) && level == Level::Low;
        let now = self.now();
        let echo = self
            .echo
            .as_ref()
            .filter(|echo| falling && echo.trigger == pin)
            .map(|echo| (echo.echo, now + echo.delay_us, echo.width_us));
        if let Some((echo_pin, start, width)) = echo {
            self.schedule_pulse(echo_pin, start, width);
        }
        Ok(())
    }

    fn digital_read(&mut self, pin: u8) -> Result<Level> {
        if self.mode_of(pin) != Some(PinMode::Input) {
            return Err(Error::PinMode {
                pin,
                mode: PinMode::Input,
            });
        }
        let now = self.now();
        let high = self
            .pulses
            .iter()
            .any(|&(p, start, end)| p == pin && start <= now && now < end);
        self.advance(1);
        Ok(Level::from(high))
    }
}

impl I2cBus for MockBoard {
    fn i2c_begin(&mut self) -> Result<()> {
        self.events.push(Event::I2cBegin);
        Ok(())
    }

    fn i2c_write(&mut self, address: u8, bytes: &[u8]) -> Result<()> {
        self.events.push(Event::I2cWrite {
            address,
            bytes: bytes.to_vec(),
            at_us: self.now(),
        });
        Ok(())
    }

    fn i2c_request(&mut self, address: u8, buf: &mut [u8]) -> Result<usize> {
        self.events.push(Event::I2cRequest {
            address,
            len: buf.len(),
            at_us: self.now(),
        });
        let reply = self.i2c_replies.pop_front().unwrap_or_default();
        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }
}

impl SerialFactory for MockBoard {
    type Serial = MockSerial;

    fn serial(&mut self, rx: u8, tx: u8) -> MockSerial {
        self.serial_pins.push((rx, tx));
        MockSerial {
            state: Arc::clone(&self.serial),
            now_us: Arc::clone(&self.now_us),
        }
    }
}

#[derive(Debug, Default)]
pub struct SerialState {
    pub baud: Option<u32>,
    pub flushes: usize,
    /// Bytes written and the time each went out
    pub written: Vec<(u8, u64)>,
    /// Bytes waiting to be read.
    pub input: VecDeque<u8>,
    /// Bytes that arrive after each command byte.
    pub reply: Vec<u8>,
    pub dropped: usize,
}

pub struct MockSerial {
    state: Arc<Mutex<SerialState>>,
    now_us: Arc<AtomicU64>,
}

impl MockSerial {
    fn started(&self) -> Result<std::sync::MutexGuard<'_, SerialState>> {
        let state = self.state.lock().unwrap();
        if state.baud.is_none() {
            return Err(Error::NotStarted);
        }
        Ok(state)
    }
}

impl Drop for MockSerial {
    fn drop(&mut self) {
        self.state.lock().unwrap().dropped += 1;
    }
}

impl SerialLink for MockSerial {
    fn begin(&mut self, baud: u32) -> Result<()> {
        self.state.lock().unwrap().baud = Some(baud);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.started()?;
        state.flushes += 1;
        state.input.clear();
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        let mut state = self.started()?;
        state.written.push((byte, self.now_us.load(Ordering::Relaxed)));
        let reply = state.reply.clone();
        state.input.extend(reply);
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.started()?.input.len())
    }

    fn read_byte(&mut self) -> Result<u8> {
        self.started()?
            .input
            .pop_front()
            .ok_or_else(|| Error::Serial("read with no data".to_string()))
    }
}
