use crate::lcd::hd44780::config::{ConfigError, DisplayConfig};
use crate::lcd::hd44780::driver::{CursorDirection, HD44780Driver};
use crate::lcd::hd44780::geometry::address_for;
use crate::lcd::{CharacterLcd, LcdCommand};
use crate::{GpioError, GpioResult};
use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};
use std::fmt::Debug;

/// Position of the cursor as tracked by the driver.
///
/// `col == columns` means the cursor went past the right edge; nothing more is printed on that
/// row until the cursor is moved back.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CursorState {
    pub row: u8,
    pub col: u8,
}

/// Text-level HD44780 display.
///
/// Keeps track of the cursor so that line breaks, tabs and backspaces can be turned into
/// addressing instructions, since the controller's own address counter is never read.
#[derive(Debug)]
pub struct HD44780Display<Drv, D> {
    driver: Drv,
    delay: D,
    config: DisplayConfig,
    cursor: CursorState,
}

impl<Drv: HD44780Driver, D: DelayNs> HD44780Display<Drv, D> {
    /// Settle time after each function set during reset.
    pub const MODE_SET_MS: u32 = 10;
    /// Settle time after ordinary instructions.
    pub const COMMAND_MS: u32 = 1;
    /// Settle time after clear and return home.
    pub const ERASE_MS: u32 = 2;
    /// Dwell time of each flash phase.
    pub const FLASH_MS: u32 = 200;
    /// Settle time after writing a character.
    pub const CHAR_US: u32 = 40;

    pub fn new(driver: Drv, config: DisplayConfig, delay: D) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(HD44780Display {
            driver,
            delay,
            config,
            cursor: CursorState::default(),
        })
    }

    pub fn cursor(&self) -> CursorState {
        self.cursor
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub fn driver(&self) -> &Drv {
        &self.driver
    }

    /// Reinitializes the controller as per the datasheet, then clears it.
    ///
    /// The function set goes out three times since the controller's state is unknown: it may
    /// still be halfway through a byte from an earlier session.
    pub fn reset(&mut self) -> GpioResult<()> {
        let config = self.config;
        info!(
            "hd44780: reset to {} lines, {} font,{} cursor{}",
            config.lines,
            if config.large_font { "5x10" } else { "5x8" },
            if config.cursor_visible { "" } else { " no" },
            if config.cursor_blink { " blinking" } else { "" },
        );

        for _ in 0..3 {
            self.driver.function_set(config.lines != 1, config.large_font)?;
            self.delay.delay_ms(Self::MODE_SET_MS);
        }

        self.driver
            .set_display_control(true, config.cursor_visible, config.cursor_blink)?;
        self.delay.delay_ms(Self::COMMAND_MS);

        self.driver.set_entry_mode(CursorDirection::Right, false)?;
        self.delay.delay_ms(Self::COMMAND_MS);

        self.clear()
    }

    /// Erases the display and homes the cursor.
    pub fn clear(&mut self) -> GpioResult<()> {
        self.driver.clear_display()?;
        self.delay.delay_ms(Self::ERASE_MS);
        self.cursor = CursorState::default();
        Ok(())
    }

    /// Homes the cursor, keeping the display contents.
    pub fn home(&mut self) -> GpioResult<()> {
        self.driver.return_home()?;
        self.delay.delay_ms(Self::ERASE_MS);
        self.cursor = CursorState::default();
        Ok(())
    }

    /// Moves one cell left. At the start of a row there's nothing to go back to, so the display
    /// flashes instead.
    pub fn backspace(&mut self) -> GpioResult<()> {
        if self.cursor.col == 0 {
            return self.flash();
        }

        self.driver.cursor_shift(false, CursorDirection::Left)?;
        self.cursor.col -= 1;
        self.delay.delay_ms(Self::COMMAND_MS);
        Ok(())
    }

    /// Moves to the start of the next row. The display never scrolls: on the last row the cursor
    /// goes past the right edge, dropping text until it's moved back.
    pub fn newline(&mut self) -> GpioResult<()> {
        if self.cursor.row + 1 < self.config.lines {
            self.cursor.row += 1;
            self.cursor.col = 0;
        } else {
            self.cursor.col = self.config.columns;
        }
        self.move_to_cursor()
    }

    pub fn carriage_return(&mut self) -> GpioResult<()> {
        self.cursor.col = 0;
        self.move_to_cursor()
    }

    /// Prints spaces up to the next tab stop, stopping at the right edge.
    pub fn tab(&mut self) -> GpioResult<()> {
        let col = u16::from(self.cursor.col);
        let width = u16::from(self.config.tab_width);
        let stop = ((col / width + 1) * width).min(self.config.columns.into());

        for _ in col..stop {
            self.write_char(b' ')?;
        }
        Ok(())
    }

    /// Blinks the whole display twice.
    pub fn flash(&mut self) -> GpioResult<()> {
        let config = self.config;
        for phase in 0..2 {
            self.driver.set_display_control(false, false, false)?;
            self.delay.delay_ms(Self::FLASH_MS);

            self.driver
                .set_display_control(true, config.cursor_visible, config.cursor_blink)?;
            if phase == 0 {
                self.delay.delay_ms(Self::FLASH_MS);
            } else {
                self.delay.delay_ms(Self::COMMAND_MS);
            }
        }
        Ok(())
    }

    /// Prints a character, unless the cursor is past the right edge.
    pub fn write_char(&mut self, c: u8) -> GpioResult<()> {
        if self.cursor.col >= self.config.columns {
            return Ok(());
        }

        self.driver.send_data(c)?;
        self.delay.delay_us(Self::CHAR_US);
        self.cursor.col += 1;
        Ok(())
    }

    fn move_to_cursor(&mut self) -> GpioResult<()> {
        let address = address_for(self.cursor.row, self.cursor.col, self.config.columns);
        self.driver.set_ddram_address(address)?;
        self.delay.delay_ms(Self::COMMAND_MS);
        Ok(())
    }
}

impl<Drv: HD44780Driver, D: DelayNs + Debug> CharacterLcd for HD44780Display<Drv, D> {
    fn name(&self) -> &'static str {
        "Hitachi HD44780"
    }

    fn prepare(&mut self) -> GpioResult<()> {
        match self.driver.set_backlight(self.config.backlight_on) {
            Err(GpioError::NotSupported) => debug!("No backlight control"),
            result => result?,
        }
        self.reset()
    }

    fn command(&mut self, command: LcdCommand) -> GpioResult<()> {
        debug!("hd44780: {}", command);
        match command {
            LcdCommand::Reset => self.reset(),
            LcdCommand::Backspace => self.backspace(),
            LcdCommand::Clear => self.clear(),
            LcdCommand::Newline => self.newline(),
            LcdCommand::CarriageReturn => self.carriage_return(),
            LcdCommand::Home => self.home(),
            LcdCommand::Tab => self.tab(),
            LcdCommand::Flash => self.flash(),
            LcdCommand::Unknown(_) => {
                warn!("{}", command);
                Ok(())
            }
        }
    }

    fn put_char(&mut self, c: u8) -> GpioResult<()> {
        self.write_char(c)
    }

    fn finish(&mut self) -> GpioResult<()> {
        debug!("hd44780: parking bus");
        self.driver.park()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lcd::hd44780::config::PinAssignment;
    use crate::lcd::hd44780::driver::GpioHD44780Driver;
    use crate::mock::{MockDelay, MockEvent, MockGpioDriver};
    use std::time::Duration;

    type MockDisplay<'a> = HD44780Display<GpioHD44780Driver<'a, MockDelay<'a>>, MockDelay<'a>>;

    const RS: usize = 0;
    const E: usize = 2;
    const BACKLIGHT: usize = 3;
    const DATA: [usize; 4] = [4, 5, 6, 7];

    fn display(gpio: &MockGpioDriver, lines: u8, columns: u8) -> MockDisplay<'_> {
        let config = DisplayConfig {
            lines,
            columns,
            ..DisplayConfig::default()
        };
        display_with(gpio, config)
    }

    fn display_with(gpio: &MockGpioDriver, config: DisplayConfig) -> MockDisplay<'_> {
        let driver = GpioHD44780Driver::from_pins(gpio, &PinAssignment::default(), gpio.delay());
        let mut display = HD44780Display::new(driver, config, gpio.delay()).unwrap();
        display.prepare().unwrap();
        gpio.clear_events();
        display
    }

    fn commands(gpio: &MockGpioDriver) -> Vec<u8> {
        gpio.transfers(RS, E, DATA)
            .into_iter()
            .filter(|transfer| !transfer.rs)
            .map(|transfer| transfer.value)
            .collect()
    }

    fn data(gpio: &MockGpioDriver) -> Vec<u8> {
        gpio.transfers(RS, E, DATA)
            .into_iter()
            .filter(|transfer| transfer.rs)
            .map(|transfer| transfer.value)
            .collect()
    }

    /// Delays of at least a millisecond, i.e. everything but the bus timing.
    fn settle_delays(gpio: &MockGpioDriver) -> Vec<u64> {
        gpio.events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Delay(duration) if duration >= Duration::from_millis(1) => {
                    Some(duration.as_millis() as u64)
                }
                _ => None,
            })
            .collect()
    }

    fn at(row: u8, col: u8) -> CursorState {
        CursorState { row, col }
    }

    #[test]
    fn prepare_resets_the_controller() {
        let gpio = MockGpioDriver::new(8);
        let driver = GpioHD44780Driver::from_pins(&gpio, &PinAssignment::default(), gpio.delay());
        let mut display = HD44780Display::new(driver, DisplayConfig::default(), gpio.delay()).unwrap();
        gpio.clear_events();

        display.prepare().unwrap();

        assert_eq!(gpio.level(BACKLIGHT), Some(true));
        assert_eq!(commands(&gpio), vec![0x28, 0x28, 0x28, 0x0C, 0x06, 0x01]);
        assert!(data(&gpio).is_empty());
        assert_eq!(settle_delays(&gpio), vec![10, 10, 10, 1, 1, 2]);
        assert_eq!(display.cursor(), at(0, 0));
    }

    #[test]
    fn reset_follows_the_options() {
        let gpio = MockGpioDriver::new(8);
        let mut config = DisplayConfig {
            backlight_on: false,
            ..DisplayConfig::default()
        };
        config.apply_options("1BCF").unwrap();
        config.columns = 40;
        let driver = GpioHD44780Driver::from_pins(&gpio, &PinAssignment::default(), gpio.delay());
        let mut display = HD44780Display::new(driver, config, gpio.delay()).unwrap();
        display.prepare().unwrap();
        assert_eq!(gpio.level(BACKLIGHT), Some(false));
        gpio.clear_events();

        display.command(LcdCommand::Reset).unwrap();

        assert_eq!(commands(&gpio), vec![0x24, 0x24, 0x24, 0x0F, 0x06, 0x01]);
        assert_eq!(gpio.level(BACKLIGHT), None);
    }

    #[test]
    fn prepare_without_backlight_pin() {
        let gpio = MockGpioDriver::new(8);
        let pins = PinAssignment {
            backlight: None,
            ..PinAssignment::default()
        };
        let driver = GpioHD44780Driver::from_pins(&gpio, &pins, gpio.delay());
        let mut display = HD44780Display::new(driver, DisplayConfig::default(), gpio.delay()).unwrap();
        gpio.clear_events();

        display.prepare().unwrap();

        assert_eq!(gpio.level(BACKLIGHT), None);
        assert_eq!(commands(&gpio), vec![0x28, 0x28, 0x28, 0x0C, 0x06, 0x01]);
        assert_eq!(display.cursor(), at(0, 0));
    }

    #[test]
    fn clear_is_idempotent() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 16);
        display.put_char(b'a').unwrap();
        display.command(LcdCommand::Newline).unwrap();
        gpio.clear_events();

        display.command(LcdCommand::Clear).unwrap();
        let first = gpio.events();
        assert_eq!(display.cursor(), at(0, 0));
        gpio.clear_events();

        display.command(LcdCommand::Clear).unwrap();
        assert_eq!(display.cursor(), at(0, 0));
        assert_eq!(gpio.events(), first);
        assert_eq!(commands(&gpio), vec![0x01]);
        assert_eq!(settle_delays(&gpio), vec![2]);
    }

    #[test]
    fn home_keeps_contents() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 16);
        display.put_char(b'a').unwrap();
        gpio.clear_events();

        display.command(LcdCommand::Home).unwrap();

        assert_eq!(commands(&gpio), vec![0x02]);
        assert_eq!(settle_delays(&gpio), vec![2]);
        assert_eq!(display.cursor(), at(0, 0));
    }

    #[test]
    fn characters_advance_the_cursor() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 16);

        display.put_char(b'h').unwrap();
        display.put_char(b'i').unwrap();

        assert_eq!(data(&gpio), b"hi".to_vec());
        assert_eq!(display.cursor(), at(0, 2));
        assert!(
            gpio.events()
                .contains(&MockEvent::Delay(Duration::from_micros(40)))
        );
    }

    #[test]
    fn characters_past_the_edge_are_dropped() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 1, 3);
        for c in b"abc" {
            display.put_char(*c).unwrap();
        }
        assert_eq!(display.cursor(), at(0, 3));
        gpio.clear_events();

        display.put_char(b'd').unwrap();

        assert_eq!(display.cursor(), at(0, 3));
        assert!(gpio.events().is_empty());
    }

    #[test]
    fn backspace_moves_left() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 16);
        display.put_char(b'a').unwrap();
        display.put_char(b'b').unwrap();
        gpio.clear_events();

        display.command(LcdCommand::Backspace).unwrap();

        assert_eq!(commands(&gpio), vec![0x10]);
        assert_eq!(settle_delays(&gpio), vec![1]);
        assert_eq!(display.cursor(), at(0, 1));
    }

    #[test]
    fn backspace_at_row_start_flashes() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 16);

        display.command(LcdCommand::Backspace).unwrap();
        let backspace = (commands(&gpio), settle_delays(&gpio));
        gpio.clear_events();
        display.command(LcdCommand::Flash).unwrap();
        let flash = (commands(&gpio), settle_delays(&gpio));

        assert_eq!(backspace.0, vec![0x08, 0x0C, 0x08, 0x0C]);
        assert_eq!(backspace.1, vec![200, 200, 200, 1]);
        assert_eq!(backspace, flash);
        assert_eq!(display.cursor(), at(0, 0));
    }

    #[test]
    fn flash_restores_cursor_settings() {
        let gpio = MockGpioDriver::new(8);
        let config = DisplayConfig {
            cursor_visible: true,
            cursor_blink: true,
            ..DisplayConfig::default()
        };
        let mut display = display_with(&gpio, config);

        display.command(LcdCommand::Flash).unwrap();

        assert_eq!(commands(&gpio), vec![0x08, 0x0F, 0x08, 0x0F]);
    }

    #[test]
    fn newline_stops_at_the_last_row() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 16);

        display.command(LcdCommand::Newline).unwrap();
        assert_eq!(display.cursor(), at(1, 0));
        display.command(LcdCommand::Newline).unwrap();
        assert_eq!(display.cursor(), at(1, 16));
        assert_eq!(commands(&gpio), vec![0x80 | 0x40, 0x80 | 0x50]);
        assert_eq!(settle_delays(&gpio), vec![1, 1]);
        gpio.clear_events();

        display.put_char(b'x').unwrap();

        assert!(gpio.events().is_empty());
        assert_eq!(display.cursor(), at(1, 16));
    }

    #[test]
    fn newline_walks_four_rows() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 4, 20);

        for _ in 0..3 {
            display.command(LcdCommand::Newline).unwrap();
        }

        assert_eq!(commands(&gpio), vec![0xC0, 0x94, 0xD4]);
        assert_eq!(display.cursor(), at(3, 0));
    }

    #[test]
    fn carriage_return_rewinds_the_row() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 4, 20);
        display.command(LcdCommand::Newline).unwrap();
        display.command(LcdCommand::Newline).unwrap();
        for c in b"abc" {
            display.put_char(*c).unwrap();
        }
        gpio.clear_events();

        display.command(LcdCommand::CarriageReturn).unwrap();

        assert_eq!(commands(&gpio), vec![0x80 | 0x14]);
        assert_eq!(display.cursor(), at(2, 0));
    }

    #[test]
    fn carriage_return_after_overflow_reenables_output() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 1, 8);
        display.command(LcdCommand::Newline).unwrap();
        assert_eq!(display.cursor(), at(0, 8));

        display.command(LcdCommand::CarriageReturn).unwrap();
        display.put_char(b'z').unwrap();

        assert_eq!(data(&gpio), vec![b'z']);
        assert_eq!(display.cursor(), at(0, 1));
    }

    #[test]
    fn tab_pads_to_the_next_stop() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 20);
        display.put_char(b'a').unwrap();
        display.put_char(b'b').unwrap();
        gpio.clear_events();

        display.command(LcdCommand::Tab).unwrap();

        assert_eq!(data(&gpio), vec![b' '; 6]);
        assert!(commands(&gpio).is_empty());
        assert_eq!(display.cursor(), at(0, 8));

        gpio.clear_events();
        display.command(LcdCommand::Tab).unwrap();
        assert_eq!(data(&gpio), vec![b' '; 8]);
        assert_eq!(display.cursor(), at(0, 16));
    }

    #[test]
    fn tab_is_clipped_at_the_edge() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 12);
        for _ in 0..9 {
            display.put_char(b'.').unwrap();
        }
        gpio.clear_events();

        display.command(LcdCommand::Tab).unwrap();
        assert_eq!(data(&gpio), vec![b' '; 3]);
        assert_eq!(display.cursor(), at(0, 12));

        gpio.clear_events();
        display.command(LcdCommand::Tab).unwrap();
        assert!(gpio.events().is_empty());
    }

    /// Delay without a `Debug` impl, so only the inherent methods are available.
    struct SilentDelay;

    impl DelayNs for SilentDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn tab_works_without_debug_delay() {
        let gpio = MockGpioDriver::new(8);
        let driver = GpioHD44780Driver::from_pins(&gpio, &PinAssignment::default(), gpio.delay());
        let mut display = HD44780Display::new(driver, DisplayConfig::default(), SilentDelay).unwrap();
        display.write_char(b'a').unwrap();
        gpio.clear_events();

        display.tab().unwrap();

        assert_eq!(data(&gpio), vec![b' '; 7]);
        assert_eq!(display.cursor(), at(0, 8));
    }

    #[test]
    fn custom_tab_width() {
        let gpio = MockGpioDriver::new(8);
        let config = DisplayConfig {
            tab_width: 4,
            ..DisplayConfig::default()
        };
        let mut display = display_with(&gpio, config);
        display.put_char(b'a').unwrap();

        display.command(LcdCommand::Tab).unwrap();

        assert_eq!(display.cursor(), at(0, 4));
    }

    #[test]
    fn unknown_commands_do_nothing() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 16);

        display.command(LcdCommand::Unknown(b'q')).unwrap();

        assert!(gpio.events().is_empty());
        assert_eq!(display.cursor(), at(0, 0));
    }

    #[test]
    fn finish_parks_the_bus() {
        let gpio = MockGpioDriver::new(8);
        let mut display = display(&gpio, 2, 16);

        display.finish().unwrap();

        assert_eq!(gpio.level(E), Some(false));
        assert_eq!(gpio.level(RS), Some(false));
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        let gpio = MockGpioDriver::new(8);
        let driver = GpioHD44780Driver::from_pins(&gpio, &PinAssignment::default(), gpio.delay());
        let config = DisplayConfig {
            lines: 4,
            columns: 40,
            ..DisplayConfig::default()
        };
        assert_eq!(
            HD44780Display::new(driver, config, gpio.delay()).unwrap_err(),
            ConfigError::TooManyCells { lines: 4, columns: 40 }
        );
    }
}
