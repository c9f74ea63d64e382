use pyo3::exceptions::{PyIOError, PyRuntimeError};
use pyo3::prelude::*;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::linux::{BoardConfig, LinuxBoard};
use crate::sensor::DistanceSensor;

const DEFAULT_CHIP: &str = "/dev/gpiochip0";

fn poisoned() -> PyErr {
    PyErr::new::<PyRuntimeError, _>("Sensor mutex poisoned".to_string())
}

// The ultrasonic sensor class
#[pyclass]
#[doc = "Ultrasonic distance sensor on GPIO, I2C, UART or a single wire.\n\n\
         Build one with gpio(), i2c(), uart() or one_wire(), call begin()\n\
         once, then get_distance() for centimeters. Reads are spaced at\n\
         least 30 ms apart."]
struct UltrasonicSensor {
    sensor: Arc<Mutex<DistanceSensor<LinuxBoard>>>,
}

impl UltrasonicSensor {
    fn wrap(sensor: DistanceSensor<LinuxBoard>) -> Self {
        UltrasonicSensor {
            sensor: Arc::new(Mutex::new(sensor)),
        }
    }

    fn lock(&self) -> PyResult<MutexGuard<'_, DistanceSensor<LinuxBoard>>> {
        self.sensor.lock().map_err(|_| poisoned())
    }
}

fn board_on_chip(chip: &str) -> LinuxBoard {
    LinuxBoard::new(BoardConfig {
        gpio_chip: chip.to_string(),
        ..BoardConfig::default()
    })
}

#[pymethods]
impl UltrasonicSensor {
    #[staticmethod]
    #[pyo3(signature = (trigger_pin, echo_pin, chip=DEFAULT_CHIP))]
    fn gpio(trigger_pin: u8, echo_pin: u8, chip: &str) -> Self {
        Self::wrap(DistanceSensor::gpio(board_on_chip(chip), trigger_pin, echo_pin))
    }

    #[staticmethod]
    #[pyo3(signature = (address, bus=1))]
    fn i2c(address: u8, bus: u8) -> Self {
        let board = LinuxBoard::new(BoardConfig {
            i2c_bus: bus,
            ..BoardConfig::default()
        });
        Self::wrap(DistanceSensor::i2c(board, address))
    }

    #[staticmethod]
    #[pyo3(signature = (rx_pin, tx_pin, port="/dev/serial0"))]
    fn uart(rx_pin: u8, tx_pin: u8, port: &str) -> Self {
        let board = LinuxBoard::new(BoardConfig {
            serial_path: port.to_string(),
            ..BoardConfig::default()
        });
        Self::wrap(DistanceSensor::uart(board, rx_pin, tx_pin))
    }

    #[staticmethod]
    #[pyo3(signature = (pin, chip=DEFAULT_CHIP))]
    fn one_wire(pin: u8, chip: &str) -> Self {
        Self::wrap(DistanceSensor::one_wire(board_on_chip(chip), pin))
    }

    fn begin(&self) -> PyResult<()> {
        self.lock()?
            .begin()
            .map_err(|e| PyErr::new::<PyIOError, _>(format!("Failed to initialize sensor: {}", e)))
    }

    /// Distance in centimeters, 0.0 when the read failed.
    fn get_distance(&self, py: Python<'_>) -> PyResult<f32> {
        let sensor = Arc::clone(&self.sensor);
        // Release the GIL, a read can block for up to a second
        py.allow_threads(move || {
            sensor
                .lock()
                .map(|mut sensor| sensor.get_distance())
                .map_err(|_| ())
        })
        .map_err(|_| poisoned())
    }

    /// (distance_cm, complete) for one reading, raising on hardware errors.
    fn measure(&self, py: Python<'_>) -> PyResult<(f32, bool)> {
        let sensor = Arc::clone(&self.sensor);
        let result = py
            .allow_threads(move || {
                sensor
                    .lock()
                    .map(|mut sensor| sensor.measure())
                    .map_err(|_| ())
            })
            .map_err(|_| poisoned())?;

        let measurement = result
            .map_err(|e| PyErr::new::<PyIOError, _>(format!("Failed to get distance: {}", e)))?;
        Ok((measurement.distance_cm, measurement.complete))
    }

    fn config(&self) -> PyResult<String> {
        Ok(format!("{:?}", self.lock()?.config()))
    }

    fn __repr__(&self) -> PyResult<String> {
        Ok(format!("UltrasonicSensor({})", self.config()?))
    }
}

// Register the module
#[pymodule]
fn ultrasonic(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<UltrasonicSensor>()?;
    Ok(())
}
