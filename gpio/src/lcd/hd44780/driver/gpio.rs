use crate::lcd::hd44780::config::{PinAssignment, PinRole};
use crate::lcd::hd44780::driver::HD44780Driver;
use crate::soft::{SoftGpioBusOutput, UnconnectedOutput};
use crate::{GpioBusOutput, GpioDriver, GpioError, GpioOutput, GpioResult};
use embedded_hal::delay::DelayNs;
use log::{info, trace, warn};
use std::cell::Cell;
use std::fmt::Display;

/// GpioHD44780 driver for the HD44780 controller on a 4-bit bus made of plain GPIO pins.
///
/// Each byte goes out as two nibbles, upper first. A nibble is presented on the data lines,
/// held for the setup time, latched with an E pulse and held again afterwards. Nothing is ever
/// read back, so a failed pin write can't be detected by the controller either: failures are
/// logged and counted, and the transfer carries on so the timing stays intact.
#[derive(Debug)]
pub struct GpioHD44780Driver<'a, D> {
    pin_e: Box<dyn GpioOutput + 'a>,
    pin_rw: Option<Box<dyn GpioOutput + 'a>>,
    pin_rs: Box<dyn GpioOutput + 'a>,
    pin_backlight: Option<Box<dyn GpioOutput + 'a>>,
    data_bus: Box<dyn GpioBusOutput<4> + 'a>,
    delay: D,
    write_errors: Cell<usize>,
}

impl<'a, D: DelayNs> GpioHD44780Driver<'a, D> {
    /// Data setup time before E rises.
    pub const SETUP_US: u32 = 20;
    /// Width of the E pulse.
    pub const STROBE_US: u32 = 40;
    /// Hold time after E falls.
    pub const HOLD_US: u32 = 20;

    /// Creates a new GpioHD44780Driver instance using 4-bit data bus.
    ///
    /// # Parameters
    ///
    /// - `pin_e`: Enable output pin.
    /// - `pin_rw`: Optional read/write output pin. If not provided, the R/W pin of the display
    ///   must be connected to GND, signifying write mode.
    /// - `pin_rs`: Register select output pin.
    /// - `data_bus`: DB4-DB7, line 0 being DB4.
    /// - `delay`: Used for the bus timing.
    pub fn new_4bit(
        pin_e: Box<dyn GpioOutput + 'a>,
        pin_rw: Option<Box<dyn GpioOutput + 'a>>,
        pin_rs: Box<dyn GpioOutput + 'a>,
        data_bus: Box<dyn GpioBusOutput<4> + 'a>,
        delay: D,
    ) -> Self {
        GpioHD44780Driver {
            pin_e,
            pin_rw,
            pin_rs,
            pin_backlight: None,
            data_bus,
            delay,
            write_errors: Cell::new(0),
        }
    }

    /// Adds a pin switching the backlight circuit.
    pub fn with_backlight(mut self, pin_backlight: Box<dyn GpioOutput + 'a>) -> Self {
        self.pin_backlight = Some(pin_backlight);
        self
    }

    /// Claims every pin of the assignment on the given GPIO device and parks the bus.
    ///
    /// A pin that can't be configured as an output doesn't stop the driver: the failure is
    /// logged and the pin is replaced with an [UnconnectedOutput], so every later write to it
    /// shows up as a write failure.
    pub fn from_pins(gpio: &'a dyn GpioDriver, pins: &PinAssignment, delay: D) -> Self {
        let claim = move |role: PinRole, index: usize| -> Box<dyn GpioOutput + 'a> {
            match gpio.get_output(index) {
                Ok(output) => output,
                Err(err) => {
                    warn!("Configuring pin {} ({}) as output failed: {}", index, role, err);
                    Box::new(UnconnectedOutput::new(index, err))
                }
            }
        };

        let data_bus: SoftGpioBusOutput<'a, 4> = SoftGpioBusOutput::new(std::array::from_fn(|n| {
            claim(PinRole::Data(n as u8), pins.data[n])
        }));

        let mut driver = Self::new_4bit(
            claim(PinRole::E, pins.e),
            pins.rw.map(|pin| claim(PinRole::Rw, pin)),
            claim(PinRole::Rs, pins.rs),
            Box::new(data_bus),
            delay,
        );
        if let Some(pin) = pins.backlight {
            driver = driver.with_backlight(claim(PinRole::Backlight, pin));
        }

        driver.idle();
        driver
    }

    /// Amount of pin writes that failed so far.
    pub fn write_errors(&self) -> usize {
        self.write_errors.get()
    }

    fn check(&self, target: impl Display, result: GpioResult<()>) {
        if let Err(err) = result {
            info!("Failed to drive {}: {}", target, err);
            self.write_errors.set(self.write_errors.get() + 1);
        }
    }

    fn idle(&self) {
        self.check(PinRole::E, self.pin_e.write(false));
        self.check(PinRole::Rs, self.pin_rs.write(false));
        if let Some(rw) = &self.pin_rw {
            self.check(PinRole::Rw, rw.write(false));
        }
    }

    fn write_nibble(&mut self, nibble: u8) {
        self.check("data bus", self.data_bus.write_nibble(nibble));
        self.delay.delay_us(Self::SETUP_US);

        self.check(PinRole::E, self.pin_e.write(true));
        self.delay.delay_us(Self::STROBE_US);
        self.check(PinRole::E, self.pin_e.write(false));
        self.delay.delay_us(Self::HOLD_US);
    }

    fn send(&mut self, data: u8, rs: bool) {
        trace!("{} -> 0x{:02x}", if rs { "data" } else { "cmd " }, data);

        // Set RW pin to write
        if let Some(rw) = &self.pin_rw {
            self.check(PinRole::Rw, rw.write(false));
        }

        // Set RS pin
        self.check(PinRole::Rs, self.pin_rs.write(rs));

        self.write_nibble(data >> 4);
        self.write_nibble(data & 0x0F);
    }
}

impl<D: DelayNs + std::fmt::Debug> HD44780Driver for GpioHD44780Driver<'_, D> {
    fn set_backlight(&mut self, on: bool) -> GpioResult<()> {
        let Some(pin) = &self.pin_backlight else {
            return Err(GpioError::NotSupported);
        };
        self.check(PinRole::Backlight, pin.write(on));
        Ok(())
    }

    fn park(&mut self) -> GpioResult<()> {
        self.idle();
        Ok(())
    }

    fn send_command(&mut self, command: u8) -> GpioResult<()> {
        self.send(command, false);
        Ok(())
    }

    fn send_data(&mut self, data: u8) -> GpioResult<()> {
        self.send(data, true);
        Ok(())
    }
}
