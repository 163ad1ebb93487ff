//! Memory-mapped GPIO driver for BCM283x (Raspberry Pi) peripherals.
//!
//! Only the output side is implemented: function select and the set/clear registers.
use crate::{GpioDriver, GpioError, GpioOutput, GpioResult};
use bitvec::vec::BitVec;
use log::debug;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::atomic::AtomicU8;

pub struct RawGpioDriver {
    mmap: MmapRaw,
    used_pins: BitVec<AtomicU8>,
}

impl RawGpioDriver {
    // 0x7e200000 on the bus, 0xFE200000 on the BCM2711
    const GPIO_BASE: u64 = 0x3F200000;

    const PIN_COUNT: usize = 58;

    const FUNCTION_INPUT: u32 = 0b000;
    const FUNCTION_OUTPUT: u32 = 0b001;

    /// Maps the GPIO register block through the given device.
    ///
    /// `/dev/gpiomem` exposes only the GPIO block, so it's mapped from offset 0. Any other device
    /// (i.e. `/dev/mem`) is mapped at the peripheral base address.
    pub fn open(path: impl AsRef<Path>) -> GpioResult<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let offset = if path.ends_with("gpiomem") {
            0
        } else {
            Self::GPIO_BASE
        };

        let mmap = MmapOptions::new()
            .offset(offset)
            .len(4096)
            .map_raw(&file)?;

        debug!("Mapped GPIO registers from {} at offset {:#x}", path.display(), offset);

        Ok(RawGpioDriver {
            mmap,
            used_pins: BitVec::repeat(false, Self::PIN_COUNT),
        })
    }

    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::open("/dev/gpiomem")
    }

    pub fn new_mem() -> GpioResult<Self> {
        Self::open("/dev/mem")
    }

    fn raw_set_pin_function(&self, pin_index: usize, function: u32) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPFSELn register
        let register_ptr = unsafe { mmap.add(pin_index / 10) };
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift);
        register_value |= function << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }

        let mmap = self.mmap.as_mut_ptr() as *mut u32;
        // GPSETn/GPCLRn register
        let register_ptr = unsafe { mmap.add(if high { 0x1c / 4 } else { 0x28 / 4 } + pin_index / 32) };
        let shift = pin_index % 32;

        unsafe { register_ptr.write_volatile(1 << shift) };

        Ok(())
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn get_output(&self, index: usize) -> GpioResult<Box<dyn GpioOutput + '_>> {
        if index >= self.count()? {
            return Err(GpioError::InvalidArgument);
        }

        if self.used_pins[index] {
            return Err(GpioError::AlreadyInUse);
        }

        self.raw_set_pin_output(index, false)?;
        self.raw_set_pin_function(index, Self::FUNCTION_OUTPUT)?;
        self.used_pins.set_aliased(index, true);

        Ok(Box::new(RawGpioOutput {
            driver: self,
            pin_index: index,
        }))
    }
}

struct RawGpioOutput<'a> {
    driver: &'a RawGpioDriver,
    pin_index: usize,
}

impl Debug for RawGpioOutput<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}][output]", self.driver, self.pin_index)
    }
}

impl GpioOutput for RawGpioOutput<'_> {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.driver.raw_set_pin_output(self.pin_index, value)
    }
}

impl Drop for RawGpioOutput<'_> {
    fn drop(&mut self) {
        // Leave the line floating once released
        _ = self.driver.raw_set_pin_function(self.pin_index, RawGpioDriver::FUNCTION_INPUT);
        self.driver.used_pins.set_aliased(self.pin_index, false);
    }
}
