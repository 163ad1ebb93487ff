//! HD44780 LCD module.
//!
//! The driver talks to the controller over a 4-bit bus without ever reading it back: the busy
//! flag isn't polled, so every instruction is followed by a fixed delay long enough for the
//! slowest controllers.
//!
//! - [driver] encodes instructions and bit-bangs them onto the pins.
//! - [geometry] maps cursor positions to DDRAM addresses.
//! - [display] keeps track of the cursor and implements the text commands on top.
//! - [config] describes the wiring and the display and validates both.
pub mod config;
pub mod display;
pub mod driver;
pub mod geometry;

pub use config::{ConfigError, DisplayConfig, PinAssignment, PinRole};
pub use display::HD44780Display;
