//! GpiodDriver implementation for driving GPIO lines through the Linux GPIO character device
//! (`/dev/gpiochipN`) using the gpiod library.
use crate::{GpioDriver, GpioError, GpioOutput, GpioResult};
use bitvec::vec::BitVec;
use log::debug;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::atomic::AtomicU8;

/// GpiodDriver is a GPIO driver that uses the gpiod library to manage GPIO lines.
///
/// The chip is opened once and closed when the driver is dropped. Lines are requested one by one
/// and released when their output handle is dropped.
pub struct GpiodDriver {
    chip: gpiod::Chip,
    used_pins: BitVec<AtomicU8>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let n = chip.num_lines() as usize;
        let bits = BitVec::repeat(false, n);
        Self {
            chip,
            used_pins: bits,
        }
    }

    /// Opens the GPIO chip at the given path, e.g. `/dev/gpiochip0`.
    pub fn open(path: impl AsRef<Path>) -> GpioResult<Self> {
        let chip = gpiod::Chip::new(path.as_ref())?;
        debug!("Opened {} with {} lines", chip.name(), chip.num_lines());
        Ok(Self::new(chip))
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.chip.name())
    }
}

impl Drop for GpiodDriver {
    fn drop(&mut self) {
        debug!("Closing {}", self.chip.name());
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.chip.num_lines() as usize)
    }

    fn get_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        let line = self.chip.request_lines(
            gpiod::Options::output([index as u32]).consumer(env!("CARGO_PKG_NAME")),
        )?;

        self.used_pins.set_aliased(index, true);

        Ok(Box::new(GpiodOutput {
            driver: self,
            pin_index: index,
            line,
        }))
    }
}

struct GpiodOutput<'a> {
    driver: &'a GpiodDriver,
    pin_index: usize,
    line: gpiod::Lines<gpiod::Output>,
}

impl Debug for GpiodOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.driver, self.pin_index)
    }
}

impl GpioOutput for GpiodOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.line.set_values([value])?;
        Ok(())
    }
}

impl Drop for GpiodOutput<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}
