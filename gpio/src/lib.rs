pub mod delay;
pub mod gpiod;
pub mod lcd;
pub mod mock;
pub mod raw;
pub mod soft;

use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A device exposing individually addressable digital pins.
///
/// The device itself is the open handle: it is acquired by the backend constructor and
/// released when the value is dropped.
pub trait GpioDriver: Debug {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Configures the GPIO pin at the given index as an output and claims it.
    ///
    /// The pin is released when the returned handle is dropped.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - `GpioError::AlreadyInUse` if the pin is already claimed.
    fn get_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>>;
}

pub trait GpioOutput: Debug {
    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;
}

pub trait GpioBusOutput<const N: usize>: Debug {
    fn write(&self, values: &[bool; N]) -> GpioResult<()>;
}

impl dyn GpioBusOutput<4> + '_ {
    /// Writes the values to the GPIO pins in the bus.
    /// The values are written as a nibble, LSb first.
    pub fn write_nibble(&self, value: u8) -> GpioResult<()> {
        if value > 0b1111 {
            return Err(GpioError::InvalidArgument);
        }

        let mut values = [false; 4];
        for (i, line) in values.iter_mut().enumerate() {
            *line = (value & (1 << i)) != 0;
        }
        self.write(&values)
    }
}
