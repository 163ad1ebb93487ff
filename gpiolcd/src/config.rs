use crate::translator::EscapePolicy;
use clap::{ArgAction, CommandFactory, FromArgMatches, Parser, ValueEnum};
use eyre::WrapErr;
use gpiolcd_gpio::lcd::LcdKind;
use gpiolcd_gpio::lcd::hd44780::{ConfigError, DisplayConfig, PinAssignment, PinRole};
use serde::{Deserialize, Deserializer};
use std::ffi::OsString;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// How the GPIO pins are reached.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Backend {
    /// Linux GPIO character device
    #[default]
    Gpiod,
    /// Memory-mapped BCM283x registers
    Mem,
    /// Log pin activity without touching any hardware
    DryRun,
}

impl Backend {
    pub fn default_device(self) -> &'static str {
        match self {
            Backend::Gpiod => "/dev/gpiochip0",
            Backend::Mem => "/dev/gpiomem",
            Backend::DryRun => "-",
        }
    }
}

#[derive(Parser, Debug)]
#[command(version, about = "Control an LCD module hung off GPIO pins")]
pub struct Cli {
    /// Increase debugging
    #[arg(short = 'D', action = ArgAction::Count)]
    pub debug: u8,

    /// LCD driver
    #[arg(short = 'd', long = "driver", env = "LCD_TYPE")]
    pub driver: Option<String>,

    /// GPIO device, defaults to the usual device of the backend
    #[arg(short = 'f', long = "device", env = "GPIOLCD_DEVICE")]
    pub device: Option<PathBuf>,

    /// GPIO backend
    #[arg(short = 'b', long, value_enum, default_value_t = Backend::Gpiod)]
    pub backend: Backend,

    /// Driver option string
    #[arg(short = 'o', long)]
    pub options: Option<String>,

    /// Pass every byte through to the display, not only printable ASCII
    #[arg(short = 'v')]
    pub verbatim: bool,

    /// Number of display lines (1, 2 or 4)
    #[arg(long)]
    pub lines: Option<u8>,

    /// Number of display columns
    #[arg(long)]
    pub columns: Option<u8>,

    /// Distance between tab stops
    #[arg(long)]
    pub tab_width: Option<u8>,

    /// Report unrecognised escapes as unknown commands instead of dropping them
    #[arg(long)]
    pub pass_unknown_escapes: bool,

    /// JSON configuration file
    #[arg(short = 'c', long = "config", env = "GPIOLCD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Message strings. If not supplied, input is read from standard input
    pub message: Vec<OsString>,
}

impl Cli {
    /// Parses the command line, exiting with the usage text on errors.
    pub fn parse_with_help() -> Self {
        let matches = Self::command().after_help(usage_notes()).get_matches();
        Self::from_arg_matches(&matches).unwrap_or_else(|err| err.exit())
    }

    fn display_layer(&self) -> DisplayLayer {
        DisplayLayer {
            lines: self.lines,
            columns: self.columns,
            tab_width: self.tab_width,
            options: self.options.clone(),
            ..DisplayLayer::default()
        }
    }
}

fn usage_notes() -> String {
    let mut notes = String::from("Drivers:\n");
    for (i, kind) in LcdKind::ALL.iter().enumerate() {
        let default = if i == 0 { " *default*" } else { "" };
        _ = writeln!(notes, "  {:<10} ({}){}", kind.code(), kind.name(), default);
        for line in kind.options() {
            _ = writeln!(notes, "      {}", line);
        }
    }
    notes.push_str(
        "\nInput:\n\
         \x20 \\n  Newline          \\r  Carriage return\n\
         \x20 \\t  Tab              \\b  Backspace (flashes at line start)\n\
         \x20 \\f  Clear display    \\a  Flash display\n\
         \x20 ESC R  Reset display  ESC H  Home cursor\n",
    );
    notes
}

/// Deserializes a field that may be explicitly `null`, telling it apart from a missing one.
fn explicit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Option<usize>>, D::Error> {
    Option::<usize>::deserialize(deserializer).map(Some)
}

fn overlay<T>(base: &mut Option<T>, top: Option<T>) {
    if top.is_some() {
        *base = top;
    }
}

/// Partial pin assignment. `Some(None)` unassigns a pin.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PinLayer {
    #[serde(deserialize_with = "explicit")]
    pub rs: Option<Option<usize>>,
    #[serde(deserialize_with = "explicit")]
    pub rw: Option<Option<usize>>,
    #[serde(deserialize_with = "explicit")]
    pub e: Option<Option<usize>>,
    #[serde(deserialize_with = "explicit")]
    pub backlight: Option<Option<usize>>,
    pub data: Option<[usize; 4]>,
}

impl PinLayer {
    fn defaults() -> Self {
        let pins = PinAssignment::default();
        PinLayer {
            rs: Some(Some(pins.rs)),
            rw: Some(pins.rw),
            e: Some(Some(pins.e)),
            backlight: Some(pins.backlight),
            data: Some(pins.data),
        }
    }

    fn merge(&mut self, other: PinLayer) {
        overlay(&mut self.rs, other.rs);
        overlay(&mut self.rw, other.rw);
        overlay(&mut self.e, other.e);
        overlay(&mut self.backlight, other.backlight);
        overlay(&mut self.data, other.data);
    }

    fn resolve(&self) -> Result<PinAssignment, ConfigError> {
        let pins = PinAssignment {
            rs: self.rs.flatten().ok_or(ConfigError::MissingPin(PinRole::Rs))?,
            rw: self.rw.flatten(),
            e: self.e.flatten().ok_or(ConfigError::MissingPin(PinRole::E))?,
            backlight: self.backlight.flatten(),
            data: self.data.ok_or(ConfigError::MissingPin(PinRole::Data(0)))?,
        };
        pins.validate()?;
        Ok(pins)
    }
}

/// Partial display configuration.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayLayer {
    pub lines: Option<u8>,
    pub columns: Option<u8>,
    pub large_font: Option<bool>,
    pub cursor_visible: Option<bool>,
    pub cursor_blink: Option<bool>,
    pub backlight_on: Option<bool>,
    pub tab_width: Option<u8>,
    /// Option letters, applied after the fields above.
    pub options: Option<String>,
}

impl DisplayLayer {
    fn apply(&self, config: &mut DisplayConfig) -> Result<(), ConfigError> {
        config.lines = self.lines.unwrap_or(config.lines);
        config.columns = self.columns.unwrap_or(config.columns);
        config.large_font = self.large_font.unwrap_or(config.large_font);
        config.cursor_visible = self.cursor_visible.unwrap_or(config.cursor_visible);
        config.cursor_blink = self.cursor_blink.unwrap_or(config.cursor_blink);
        config.backlight_on = self.backlight_on.unwrap_or(config.backlight_on);
        config.tab_width = self.tab_width.unwrap_or(config.tab_width);
        if let Some(options) = &self.options {
            config.apply_options(options)?;
        }
        Ok(())
    }
}

/// Contents of the JSON configuration file. Every field is optional.
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub driver: Option<String>,
    pub device: Option<PathBuf>,
    pub pins: PinLayer,
    pub display: DisplayLayer,
}

impl ConfigFile {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("can't open config file '{}'", path.display()))?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader)
            .wrap_err_with(|| format!("invalid config file '{}'", path.display()))
    }
}

fn parse_pin(value: &str) -> eyre::Result<Option<usize>> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    Ok(Some(value.parse()?))
}

fn parse_pin_bus(pin_str: &str) -> eyre::Result<[usize; 4]> {
    pin_str
        .split([',', ' ', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse())
        .collect::<Result<Vec<_>, _>>()?
        .try_into()
        .map_err(|_| eyre::eyre!("Invalid number of data pins"))
}

/// Reads the `GPIOLCD_*` variables through `lookup`.
fn env_layers(lookup: impl Fn(&str) -> Option<String>) -> eyre::Result<(PinLayer, DisplayLayer)> {
    let pin = |name: &str| -> eyre::Result<Option<Option<usize>>> {
        lookup(name)
            .map(|value| parse_pin(&value).wrap_err_with(|| format!("invalid {}", name)))
            .transpose()
    };
    let number = |name: &str| -> eyre::Result<Option<u8>> {
        lookup(name)
            .map(|value| {
                value
                    .trim()
                    .parse()
                    .wrap_err_with(|| format!("invalid {}", name))
            })
            .transpose()
    };

    let pins = PinLayer {
        rs: pin("GPIOLCD_PIN_RS")?,
        rw: pin("GPIOLCD_PIN_RW")?,
        e: pin("GPIOLCD_PIN_E")?,
        backlight: pin("GPIOLCD_PIN_BACKLIGHT")?,
        data: lookup("GPIOLCD_PINS_DATA")
            .map(|value| parse_pin_bus(&value).wrap_err("invalid GPIOLCD_PINS_DATA"))
            .transpose()?,
    };
    let display = DisplayLayer {
        lines: number("GPIOLCD_LINES")?,
        columns: number("GPIOLCD_COLUMNS")?,
        ..DisplayLayer::default()
    };
    Ok((pins, display))
}

/// Fully merged and validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub kind: LcdKind,
    pub backend: Backend,
    pub device: PathBuf,
    pub pins: PinAssignment,
    pub display: DisplayConfig,
    pub allow_all: bool,
    pub escape_policy: EscapePolicy,
}

impl Settings {
    /// Merges defaults, the config file, the environment and the command line, in that order.
    pub fn load(cli: &Cli) -> eyre::Result<Self> {
        let file = match &cli.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        let env = env_layers(|name| std::env::var(name).ok())?;
        Self::merge(cli, file, env)
    }

    fn merge(cli: &Cli, file: ConfigFile, env: (PinLayer, DisplayLayer)) -> eyre::Result<Self> {
        let (env_pins, env_display) = env;

        let driver = cli.driver.clone().or(file.driver);
        let kind = match driver {
            Some(code) => LcdKind::from_code(&code)?,
            None => LcdKind::default(),
        };

        let mut pins = PinLayer::defaults();
        pins.merge(file.pins);
        pins.merge(env_pins);
        let pins = pins.resolve()?;

        let mut display = DisplayConfig::default();
        for layer in [&file.display, &env_display, &cli.display_layer()] {
            layer.apply(&mut display)?;
        }
        display.validate()?;

        let device = cli
            .device
            .clone()
            .or(file.device)
            .unwrap_or_else(|| PathBuf::from(cli.backend.default_device()));

        Ok(Settings {
            kind,
            backend: cli.backend,
            device,
            pins,
            display,
            allow_all: cli.verbatim,
            escape_policy: if cli.pass_unknown_escapes {
                EscapePolicy::PassThrough
            } else {
                EscapePolicy::Drop
            },
        })
    }
}
