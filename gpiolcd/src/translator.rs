use gpiolcd_gpio::GpioResult;
use gpiolcd_gpio::lcd::{CharacterLcd, LcdCommand};
use log::debug;

/// Introduces a two byte escape sequence.
pub const ESCAPE: u8 = 0x1B;

/// What happens to escape sequences without a meaning.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum EscapePolicy {
    /// The sequence is silently discarded.
    #[default]
    Drop,
    /// The escaped byte is handed to the display as [LcdCommand::Unknown], which reports it.
    PassThrough,
}

/// Turns a byte stream into display commands and characters.
///
/// | Input        | Result                    |
/// |--------------|---------------------------|
/// | `ESC R`      | [LcdCommand::Reset]       |
/// | `ESC H`      | [LcdCommand::Home]        |
/// | `\n`         | [LcdCommand::Newline]     |
/// | `\r`         | [LcdCommand::CarriageReturn] |
/// | `\t`         | [LcdCommand::Tab]         |
/// | `\x07` (bel) | [LcdCommand::Flash]       |
/// | `\x08` (bs)  | [LcdCommand::Backspace]   |
/// | `\x0c` (ff)  | [LcdCommand::Clear]       |
///
/// Printable ASCII is printed, any other byte is dropped unless `allow_all` is set.
#[derive(Debug, Default)]
pub struct InputTranslator {
    escape_pending: bool,
    pub allow_all: bool,
    pub escape_policy: EscapePolicy,
}

impl InputTranslator {
    pub fn new(allow_all: bool, escape_policy: EscapePolicy) -> Self {
        InputTranslator {
            escape_pending: false,
            allow_all,
            escape_policy,
        }
    }

    /// Whether the last byte started an escape sequence.
    pub fn escape_pending(&self) -> bool {
        self.escape_pending
    }

    pub fn feed(&mut self, lcd: &mut (impl CharacterLcd + ?Sized), input: &[u8]) -> GpioResult<()> {
        for &byte in input {
            self.process(lcd, byte)?;
        }
        Ok(())
    }

    pub fn process(&mut self, lcd: &mut (impl CharacterLcd + ?Sized), byte: u8) -> GpioResult<()> {
        if self.escape_pending {
            self.escape_pending = false;
            return match byte {
                b'R' => lcd.command(LcdCommand::Reset),
                b'H' => lcd.command(LcdCommand::Home),
                other => match self.escape_policy {
                    EscapePolicy::Drop => {
                        debug!("Dropping unknown escape 0x{:02x}", other);
                        Ok(())
                    }
                    EscapePolicy::PassThrough => lcd.command(LcdCommand::Unknown(other)),
                },
            };
        }

        match byte {
            ESCAPE => {
                self.escape_pending = true;
                Ok(())
            }
            b'\n' => lcd.command(LcdCommand::Newline),
            b'\r' => lcd.command(LcdCommand::CarriageReturn),
            b'\t' => lcd.command(LcdCommand::Tab),
            0x07 => lcd.command(LcdCommand::Flash),
            0x08 => lcd.command(LcdCommand::Backspace),
            0x0C => lcd.command(LcdCommand::Clear),
            c if self.allow_all || c == b' ' || c.is_ascii_graphic() => lcd.put_char(c),
            _ => Ok(()),
        }
    }
}
