//! Character LCD drivers.
//!
//! Every supported controller implements [CharacterLcd], which is all the text front-end needs:
//! preparing the display, running [LcdCommand]s, printing characters and letting go of the bus.
pub mod hd44780;

use crate::{GpioError, GpioResult};
use hd44780::config::ConfigError;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting a display up. Once a display runs, pin failures are logged
/// rather than returned, see [hd44780::driver::GpioHD44780Driver].
#[derive(Debug, Error)]
pub enum LcdError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("LCD driver '{0}' not known")]
    UnknownDriver(String),
    #[error("can't open '{}': {source}", path.display())]
    DeviceOpen { path: PathBuf, source: GpioError },
    #[error("GPIO error: {0}")]
    Gpio(#[from] GpioError),
}

pub type LcdResult<T> = Result<T, LcdError>;

/// High level display operations understood by every driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LcdCommand {
    /// Full reinitialization of the controller, followed by [LcdCommand::Clear].
    Reset,
    /// Moves the cursor one cell to the left, or flashes the display if it can't.
    Backspace,
    /// Erases the display and homes the cursor.
    Clear,
    /// Moves to the start of the next row.
    Newline,
    /// Moves to the start of the current row.
    CarriageReturn,
    /// Homes the cursor without erasing.
    Home,
    /// Pads with spaces up to the next tab stop.
    Tab,
    /// Blinks the whole display as a visible bell.
    Flash,
    /// A command code with no handler. Drivers report it and do nothing else.
    Unknown(u8),
}

impl Display for LcdCommand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LcdCommand::Unknown(code) if code.is_ascii_graphic() => {
                write!(f, "unknown command {}", *code as char)
            }
            LcdCommand::Unknown(code) => write!(f, "unknown command {:#x}", code),
            command => write!(f, "{:?}", command),
        }
    }
}

/// A character display driven one byte at a time.
pub trait CharacterLcd: Debug {
    /// Human readable name of the controller.
    fn name(&self) -> &'static str;

    /// Brings the display into a known state. Must be called before anything else.
    fn prepare(&mut self) -> GpioResult<()>;

    /// Runs a single display command.
    fn command(&mut self, command: LcdCommand) -> GpioResult<()>;

    /// Prints a character at the cursor.
    fn put_char(&mut self, c: u8) -> GpioResult<()>;

    /// Leaves the bus in an idle state. The display keeps showing its contents.
    fn finish(&mut self) -> GpioResult<()>;
}

/// Supported display controllers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum LcdKind {
    #[default]
    HD44780,
}

impl LcdKind {
    pub const ALL: [LcdKind; 1] = [LcdKind::HD44780];

    /// Short code used to select the driver.
    pub fn code(self) -> &'static str {
        match self {
            LcdKind::HD44780 => "hd44780",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            LcdKind::HD44780 => "Hitachi HD44780 and compatibles",
        }
    }

    /// Descriptions of the driver specific option letters.
    pub fn options(self) -> &'static [&'static str] {
        match self {
            LcdKind::HD44780 => hd44780::config::OPTION_HELP,
        }
    }

    pub fn from_code(code: &str) -> LcdResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.code() == code)
            .ok_or_else(|| LcdError::UnknownDriver(code.to_string()))
    }
}
