mod gpio;

use crate::{GpioError, GpioResult};
pub use gpio::*;
use std::fmt::Debug;

/// Instruction level access to an HD44780 controller.
///
/// The provided methods encode the instruction set on top of [Self::send_command]; they don't
/// wait for the controller to finish, that's up to the caller since the settle time differs
/// between instructions.
pub trait HD44780Driver: Debug {
    /// Clears the display and sets the cursor to the home position.
    fn clear_display(&mut self) -> GpioResult<()> {
        self.send_command(0b00000001)
    }

    /// Sets the cursor to the home position.
    fn return_home(&mut self) -> GpioResult<()> {
        self.send_command(0b00000010)
    }

    /// Sets the display to the specified entry mode.
    fn set_entry_mode(&mut self, cursor_direction: CursorDirection, shift: bool) -> GpioResult<()> {
        let mut command = 0b00000100;
        if cursor_direction == CursorDirection::Right {
            command |= 0b00000010;
        }
        if shift {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Sets the display on/off, cursor on/off, and blinking on/off.
    fn set_display_control(
        &mut self,
        display_on: bool,
        cursor_on: bool,
        blink_on: bool,
    ) -> GpioResult<()> {
        let mut command = 0b00001000;
        if display_on {
            command |= 0b00000100;
        }
        if cursor_on {
            command |= 0b00000010;
        }
        if blink_on {
            command |= 0b00000001;
        }
        self.send_command(command)
    }

    /// Moves the cursor or shifts the display.
    fn cursor_shift(&mut self, display_shift: bool, direction: CursorDirection) -> GpioResult<()> {
        let mut command = 0b00010000;
        if display_shift {
            command |= 0b00001000;
        }
        if direction == CursorDirection::Right {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the function set.
    ///
    /// The data length bit is always cleared, only the 4-bit interface is supported.
    fn function_set(&mut self, two_lines: bool, font: bool) -> GpioResult<()> {
        let mut command = 0b00100000;
        if two_lines {
            command |= 0b00001000;
        }
        if font {
            command |= 0b00000100;
        }
        self.send_command(command)
    }

    /// Sets the DDRAM address.
    fn set_ddram_address(&mut self, address: u8) -> GpioResult<()> {
        if address > 0b01111111 {
            return Err(GpioError::InvalidArgument);
        }
        let command = 0b10000000 | address;
        self.send_command(command)
    }

    /// Switches the backlight, if the driver controls one.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if there's no backlight control.
    fn set_backlight(&mut self, _on: bool) -> GpioResult<()> {
        Err(GpioError::NotSupported)
    }

    /// Puts the bus into its idle state, so that the controller ignores whatever happens on the
    /// lines after the driver lets go of them.
    fn park(&mut self) -> GpioResult<()> {
        Ok(())
    }

    // Low-level commands
    // These raw commands are used by the high-level functions above.
    // They are not meant to be used directly, but implemented by the driver implementation.

    /// Sends a command to the HD44780 controller.
    /// Sets the RS pin to 0 (command).
    fn send_command(&mut self, command: u8) -> GpioResult<()>;

    /// Sends data to the HD44780 controller.
    /// Sets the RS pin to 1 (data).
    fn send_data(&mut self, data: u8) -> GpioResult<()>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CursorDirection {
    /// Moves the cursor to the left after writing/reading data.
    Left,
    /// Moves the cursor to the right after writing/reading data.
    Right,
}
