//! Software compositions of GPIO outputs.
use crate::{GpioBusOutput, GpioError, GpioOutput, GpioResult};
use std::fmt::{Debug, Formatter};

/// A bus made of individually claimed output pins.
///
/// Every line is driven on each write, even if an earlier line failed. The first failure
/// is reported after all lines were attempted, so a single broken line doesn't leave the
/// rest of the bus in a stale state.
pub struct SoftGpioBusOutput<'a, const N: usize> {
    pins: [Box<dyn GpioOutput + 'a>; N],
}

impl<'a, const N: usize> SoftGpioBusOutput<'a, N> {
    pub fn new(pins: [Box<dyn GpioOutput + 'a>; N]) -> Self {
        Self { pins }
    }
}

impl<const N: usize> Debug for SoftGpioBusOutput<'_, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SoftGpioBusOutput({:?})", self.pins)
    }
}

impl<const N: usize> GpioBusOutput<N> for SoftGpioBusOutput<'_, N> {
    fn write(&self, values: &[bool; N]) -> GpioResult<()> {
        let mut result = Ok(());
        for (pin, &value) in self.pins.iter().zip(values) {
            if let Err(err) = pin.write(value) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

/// Stand-in for a pin that could not be configured as an output.
///
/// Every write fails with the original configuration error, so the problem keeps showing up
/// in the logs instead of disappearing after startup.
pub struct UnconnectedOutput {
    pin_index: usize,
    error: GpioError,
}

impl UnconnectedOutput {
    pub fn new(pin_index: usize, error: GpioError) -> Self {
        Self { pin_index, error }
    }
}

impl Debug for UnconnectedOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unconnected[{}]({})", self.pin_index, self.error)
    }
}

impl GpioOutput for UnconnectedOutput {
    fn write(&self, _value: bool) -> GpioResult<()> {
        Err(self.error.clone())
    }
}
