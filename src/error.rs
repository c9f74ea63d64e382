use crate::board::PinMode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("GPIO error: {0}")]
    Gpio(#[from] std::io::Error),
    #[error("I2C error: {0}")]
    I2c(String),
    #[error("Serial error: {0}")]
    Serial(String),
    #[error("Pin {pin} is not configured as {mode:?}")]
    PinMode { pin: u8, mode: PinMode },
    #[error("Transport used before begin()")]
    NotStarted,
}

pub type Result<T> = core::result::Result<T, Error>;
