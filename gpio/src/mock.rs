//! Recording GPIO backend.
//!
//! Nothing is driven; every configuration, pin write and delay is appended to a single ordered
//! log instead. Used by the tests and by the dry-run mode of the command line tool, where the
//! log is also echoed at trace level.
use crate::{GpioDriver, GpioError, GpioOutput, GpioResult};
use bitvec::vec::BitVec;
use embedded_hal::delay::DelayNs;
use log::trace;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::AtomicU8;
use std::time::Duration;

/// A single recorded operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MockEvent {
    /// The pin was configured as an output.
    Configure(usize),
    /// The pin was driven to the given level.
    Write(usize, bool),
    /// The caller waited for the given duration.
    Delay(Duration),
}

/// One byte latched by the controller, reconstructed from the recorded pin levels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MockTransfer {
    /// Level of the RS pin when the byte was latched (`true` for data).
    pub rs: bool,
    pub value: u8,
}

pub struct MockGpioDriver {
    pin_count: usize,
    used_pins: BitVec<AtomicU8>,
    failing_config: BitVec<AtomicU8>,
    failing_writes: BitVec<AtomicU8>,
    events: RefCell<Vec<MockEvent>>,
    keep_events: bool,
}

impl MockGpioDriver {
    pub fn new(pin_count: usize) -> Self {
        Self {
            pin_count,
            used_pins: BitVec::repeat(false, pin_count),
            failing_config: BitVec::repeat(false, pin_count),
            failing_writes: BitVec::repeat(false, pin_count),
            events: RefCell::new(Vec::new()),
            keep_events: true,
        }
    }

    /// Creates a driver that only traces its events without storing them, for long dry runs.
    pub fn unrecorded(pin_count: usize) -> Self {
        Self {
            keep_events: false,
            ..Self::new(pin_count)
        }
    }

    /// Makes configuring the given pin fail with an IO error.
    pub fn fail_config(&self, index: usize) {
        self.failing_config.set_aliased(index, true);
    }

    /// Makes every write to the given pin fail with an IO error.
    pub fn fail_writes(&self, index: usize) {
        self.failing_writes.set_aliased(index, true);
    }

    /// Gets a delay provider that records into this driver's log.
    pub fn delay(&self) -> MockDelay<'_> {
        MockDelay { driver: self }
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.events.borrow().clone()
    }

    pub fn clear_events(&self) {
        self.events.borrow_mut().clear();
    }

    /// Gets the last level successfully written to the pin, if any.
    pub fn level(&self, index: usize) -> Option<bool> {
        self.events.borrow().iter().rev().find_map(|event| match *event {
            MockEvent::Write(pin, level) if pin == index => Some(level),
            _ => None,
        })
    }

    /// Sum of all recorded delays.
    pub fn total_delay(&self) -> Duration {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match *event {
                MockEvent::Delay(duration) => Some(duration),
                _ => None,
            })
            .sum()
    }

    /// Decodes the log into the bytes an HD44780 on a 4-bit bus would have latched.
    ///
    /// A nibble is latched on every falling edge of `e`, taking the current levels of `data`
    /// (line 0 is the least significant bit). Nibbles are paired upper then lower; a trailing
    /// unpaired nibble is ignored.
    pub fn transfers(&self, rs: usize, e: usize, data: [usize; 4]) -> Vec<MockTransfer> {
        let mut levels: HashMap<usize, bool> = HashMap::new();
        let mut pending: Option<u8> = None;
        let mut transfers = Vec::new();

        for event in self.events.borrow().iter() {
            let MockEvent::Write(pin, level) = *event else {
                continue;
            };

            let falling_edge = pin == e && !level && levels.get(&e).copied().unwrap_or(false);
            levels.insert(pin, level);
            if !falling_edge {
                continue;
            }

            let nibble = data.iter().enumerate().fold(0u8, |acc, (bit, line)| {
                if levels.get(line).copied().unwrap_or(false) {
                    acc | (1 << bit)
                } else {
                    acc
                }
            });

            match pending.take() {
                None => pending = Some(nibble),
                Some(high) => transfers.push(MockTransfer {
                    rs: levels.get(&rs).copied().unwrap_or(false),
                    value: (high << 4) | nibble,
                }),
            }
        }

        transfers
    }

    fn record(&self, event: MockEvent) {
        trace!("{:?}", event);
        if self.keep_events {
            self.events.borrow_mut().push(event);
        }
    }
}

impl Debug for MockGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockGpioDriver({})", self.pin_count)
    }
}

impl GpioDriver for MockGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.pin_count)
    }

    fn get_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        if self.failing_config[index] {
            return Err(GpioError::Io(std::io::ErrorKind::PermissionDenied));
        }

        self.used_pins.set_aliased(index, true);
        self.record(MockEvent::Configure(index));

        Ok(Box::new(MockOutput {
            driver: self,
            pin_index: index,
        }))
    }
}

struct MockOutput<'a> {
    driver: &'a MockGpioDriver,
    pin_index: usize,
}

impl Debug for MockOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.driver, self.pin_index)
    }
}

impl GpioOutput for MockOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        if self.driver.failing_writes[self.pin_index] {
            return Err(GpioError::Io(std::io::ErrorKind::BrokenPipe));
        }
        self.driver.record(MockEvent::Write(self.pin_index, value));
        Ok(())
    }
}

impl Drop for MockOutput<'_> {
    fn drop(&mut self) {
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}

/// Delay provider that logs the requested duration instead of sleeping.
#[derive(Copy, Clone, Debug)]
pub struct MockDelay<'a> {
    driver: &'a MockGpioDriver,
}

impl DelayNs for MockDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.driver.record(MockEvent::Delay(Duration::from_nanos(ns.into())));
    }

    fn delay_us(&mut self, us: u32) {
        self.driver.record(MockEvent::Delay(Duration::from_micros(us.into())));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.driver.record(MockEvent::Delay(Duration::from_millis(ms.into())));
    }
}
