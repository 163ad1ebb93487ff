use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Largest amount of character cells an HD44780 can address.
pub const MAX_CELLS: usize = 80;

/// Help text for the letters accepted by [DisplayConfig::apply_options].
pub const OPTION_HELP: &[&str] = &[
    "Reset options:",
    "    1     1-line display (default multiple)",
    "    B     Cursor blink enable",
    "    C     Cursor enable",
    "    F     Large font select",
];

#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum ConfigError {
    #[error("unsupported line count {0}, expected 1, 2 or 4")]
    InvalidLines(u8),
    #[error("column count must be positive")]
    InvalidColumns,
    #[error("{lines}x{columns} display exceeds {} cells", MAX_CELLS)]
    TooManyCells { lines: u8, columns: u8 },
    #[error("tab width must be positive")]
    InvalidTabWidth,
    #[error("no pin assigned to {0}")]
    MissingPin(PinRole),
    #[error("pin {pin} assigned to both {first} and {second}")]
    PinConflict {
        pin: usize,
        first: PinRole,
        second: PinRole,
    },
    #[error("unknown option code '{0}'")]
    UnknownOption(char),
}

/// Logical function of a pin wired to the display.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinRole {
    /// Register select.
    Rs,
    /// Read/write direction.
    Rw,
    /// Enable (strobe).
    E,
    /// Backlight control circuit.
    Backlight,
    /// Data line `n` of the 4-bit bus, connected to DB(4+n).
    Data(u8),
}

impl Display for PinRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PinRole::Rs => write!(f, "RS"),
            PinRole::Rw => write!(f, "R/W"),
            PinRole::E => write!(f, "E"),
            PinRole::Backlight => write!(f, "backlight"),
            PinRole::Data(n) => write!(f, "data {}", n),
        }
    }
}

/// Pin numbers of every line going to the display.
///
/// R/W and the backlight are optional: R/W may be tied to ground, in which case the display is
/// write-only anyway.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PinAssignment {
    pub rs: usize,
    pub rw: Option<usize>,
    pub e: usize,
    pub backlight: Option<usize>,
    pub data: [usize; 4],
}

impl Default for PinAssignment {
    /// RS, R/W, E and the backlight on pins 0-3, DB4-DB7 on pins 4-7.
    fn default() -> Self {
        PinAssignment {
            rs: 0,
            rw: Some(1),
            e: 2,
            backlight: Some(3),
            data: [4, 5, 6, 7],
        }
    }
}

impl PinAssignment {
    /// Iterates over all assigned pins with their roles.
    pub fn roles(&self) -> impl Iterator<Item = (PinRole, usize)> + '_ {
        [
            Some((PinRole::Rs, self.rs)),
            self.rw.map(|pin| (PinRole::Rw, pin)),
            Some((PinRole::E, self.e)),
            self.backlight.map(|pin| (PinRole::Backlight, pin)),
        ]
        .into_iter()
        .flatten()
        .chain(
            self.data
                .iter()
                .enumerate()
                .map(|(n, &pin)| (PinRole::Data(n as u8), pin)),
        )
    }

    /// Checks that no pin is used twice.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let roles: Vec<_> = self.roles().collect();
        for (i, &(first, pin)) in roles.iter().enumerate() {
            if let Some(&(second, _)) = roles[i + 1..].iter().find(|(_, other)| *other == pin) {
                return Err(ConfigError::PinConflict { pin, first, second });
            }
        }
        Ok(())
    }
}

/// Geometry and appearance of the display.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DisplayConfig {
    pub lines: u8,
    pub columns: u8,
    /// 5x10 dots instead of 5x8.
    pub large_font: bool,
    pub cursor_visible: bool,
    pub cursor_blink: bool,
    pub backlight_on: bool,
    /// Distance between tab stops.
    pub tab_width: u8,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            lines: 4,
            columns: 20,
            large_font: false,
            cursor_visible: false,
            cursor_blink: false,
            backlight_on: true,
            tab_width: 8,
        }
    }
}

impl DisplayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.lines, 1 | 2 | 4) {
            return Err(ConfigError::InvalidLines(self.lines));
        }
        if self.columns == 0 {
            return Err(ConfigError::InvalidColumns);
        }
        if self.lines as usize * self.columns as usize > MAX_CELLS {
            return Err(ConfigError::TooManyCells {
                lines: self.lines,
                columns: self.columns,
            });
        }
        if self.tab_width == 0 {
            return Err(ConfigError::InvalidTabWidth);
        }
        Ok(())
    }

    /// Applies a string of option letters, see [OPTION_HELP].
    pub fn apply_options(&mut self, options: &str) -> Result<(), ConfigError> {
        for option in options.chars() {
            match option {
                '1' => self.lines = 1,
                'B' => self.cursor_blink = true,
                'C' => self.cursor_visible = true,
                'F' => self.large_font = true,
                other => return Err(ConfigError::UnknownOption(other)),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_wiring_is_valid() {
        assert!(PinAssignment::default().validate().is_ok());
        assert_eq!(PinAssignment::default().roles().count(), 8);
    }

    #[test]
    fn optional_pins_are_skipped() {
        let pins = PinAssignment {
            rw: None,
            backlight: None,
            ..PinAssignment::default()
        };
        let roles: Vec<_> = pins.roles().map(|(role, _)| role).collect();
        assert_eq!(
            roles,
            vec![
                PinRole::Rs,
                PinRole::E,
                PinRole::Data(0),
                PinRole::Data(1),
                PinRole::Data(2),
                PinRole::Data(3),
            ]
        );
    }

    #[test]
    fn pin_conflicts_are_reported() {
        let pins = PinAssignment {
            backlight: Some(6),
            ..PinAssignment::default()
        };
        assert_eq!(
            pins.validate(),
            Err(ConfigError::PinConflict {
                pin: 6,
                first: PinRole::Backlight,
                second: PinRole::Data(2),
            })
        );
    }

    #[test]
    fn geometry_is_validated() {
        let config = DisplayConfig::default();
        assert!(config.validate().is_ok());

        let three_lines = DisplayConfig { lines: 3, ..config };
        assert_eq!(three_lines.validate(), Err(ConfigError::InvalidLines(3)));

        let no_columns = DisplayConfig { columns: 0, ..config };
        assert_eq!(no_columns.validate(), Err(ConfigError::InvalidColumns));

        let too_wide = DisplayConfig { columns: 21, ..config };
        assert_eq!(
            too_wide.validate(),
            Err(ConfigError::TooManyCells { lines: 4, columns: 21 })
        );

        let single_line = DisplayConfig { lines: 1, columns: 80, ..config };
        assert!(single_line.validate().is_ok());

        let no_tabs = DisplayConfig { tab_width: 0, ..config };
        assert_eq!(no_tabs.validate(), Err(ConfigError::InvalidTabWidth));
    }

    #[test]
    fn option_letters() {
        let mut config = DisplayConfig::default();
        config.apply_options("1BCF").unwrap();
        assert_eq!(config.lines, 1);
        assert!(config.cursor_blink);
        assert!(config.cursor_visible);
        assert!(config.large_font);

        assert_eq!(
            DisplayConfig::default().apply_options("Cx"),
            Err(ConfigError::UnknownOption('x'))
        );
    }
}
