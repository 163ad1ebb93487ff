mod config;
mod translator;

use crate::config::{Backend, Cli, Settings};
use crate::translator::InputTranslator;
use dotenv::dotenv;
use eyre::WrapErr;
use gpiolcd_gpio::delay::SleepDelay;
use gpiolcd_gpio::gpiod::GpiodDriver;
use gpiolcd_gpio::lcd::hd44780::HD44780Display;
use gpiolcd_gpio::lcd::hd44780::driver::GpioHD44780Driver;
use gpiolcd_gpio::lcd::{CharacterLcd, LcdError, LcdKind};
use gpiolcd_gpio::mock::MockGpioDriver;
use gpiolcd_gpio::raw::RawGpioDriver;
use gpiolcd_gpio::{GpioDriver, GpioError, GpioResult};
use log::{LevelFilter, debug, info};
use std::ffi::OsString;
use std::io::Read;

/// Most pins a dry run pretends to have.
const DRY_RUN_MAX_PINS: usize = 1024;

fn init_logger(debug: u8) {
    let level = match debug {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    pretty_env_logger::formatted_builder()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn dry_run_driver(settings: &Settings) -> GpioResult<MockGpioDriver> {
    let pin_count = settings
        .pins
        .roles()
        .map(|(_, pin)| pin.saturating_add(1))
        .max()
        .unwrap_or(0);
    if pin_count > DRY_RUN_MAX_PINS {
        return Err(GpioError::InvalidArgument);
    }
    Ok(MockGpioDriver::unrecorded(pin_count))
}

fn open_backend(settings: &Settings) -> eyre::Result<Box<dyn GpioDriver>> {
    let device = &settings.device;
    let gpio: GpioResult<Box<dyn GpioDriver>> = match settings.backend {
        Backend::Gpiod => GpiodDriver::open(device).map(|gpio| Box::new(gpio) as Box<dyn GpioDriver>),
        Backend::Mem => RawGpioDriver::open(device).map(|gpio| Box::new(gpio) as Box<dyn GpioDriver>),
        Backend::DryRun => dry_run_driver(settings).map(|gpio| Box::new(gpio) as Box<dyn GpioDriver>),
    };

    let gpio = gpio
        .map_err(|source| LcdError::DeviceOpen {
            path: device.clone(),
            source,
        })
        .wrap_err("GPIO backend unavailable")?;
    debug!("{:?} initialized.", gpio);
    Ok(gpio)
}

fn translate_input(
    lcd: &mut dyn CharacterLcd,
    translator: &mut InputTranslator,
    input: impl Read,
) -> eyre::Result<()> {
    for byte in input.bytes() {
        let byte = byte.wrap_err("reading input")?;
        translator.process(&mut *lcd, byte)?;
    }
    Ok(())
}

fn drive(lcd: &mut dyn CharacterLcd, settings: &Settings, input: impl Read) -> eyre::Result<()> {
    info!("Using {} driver", lcd.name());
    lcd.prepare()?;

    let mut translator = InputTranslator::new(settings.allow_all, settings.escape_policy);
    let result = translate_input(lcd, &mut translator, input);

    // Park the bus even if the input couldn't be read
    let finished = lcd.finish();
    result?;
    finished?;
    Ok(())
}

/// Drives the display from `input` and returns the amount of failed pin writes.
fn run(gpio: &dyn GpioDriver, settings: &Settings, input: impl Read) -> eyre::Result<usize> {
    match settings.kind {
        LcdKind::HD44780 => {
            let driver = GpioHD44780Driver::from_pins(gpio, &settings.pins, SleepDelay);
            let mut lcd = HD44780Display::new(driver, settings.display, SleepDelay)?;
            let result = drive(&mut lcd, settings, input);

            let failed = lcd.driver().write_errors();
            if failed > 0 {
                info!("{} pin write(s) failed", failed);
            }
            result.map(|()| failed)
        }
    }
}

fn message_bytes(message: &[OsString]) -> Vec<u8> {
    message
        .iter()
        .flat_map(|arg| arg.as_encoded_bytes().iter().copied())
        .collect()
}

fn main() -> eyre::Result<()> {
    // Initialize environment and logger
    dotenv().ok();
    let cli = Cli::parse_with_help();
    init_logger(cli.debug);

    let settings = Settings::load(&cli)?;
    info!(
        "{} {}x{} @ RS: {}, RW: {:?}, E: {}, Backlight: {:?}, Data: {:?}",
        settings.kind.code(),
        settings.display.columns,
        settings.display.lines,
        settings.pins.rs,
        settings.pins.rw,
        settings.pins.e,
        settings.pins.backlight,
        settings.pins.data,
    );

    let gpio = open_backend(&settings)?;
    if cli.message.is_empty() {
        debug!("Reading input from stdin");
        run(&*gpio, &settings, std::io::stdin().lock())?;
    } else {
        debug!("Reading input from {} argument(s)", cli.message.len());
        run(&*gpio, &settings, message_bytes(&cli.message).as_slice())?;
    }
    Ok(())
}
