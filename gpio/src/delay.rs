use embedded_hal::delay::DelayNs;
use std::thread::sleep;
use std::time::Duration;

/// Blocking delay backed by [`std::thread::sleep`].
///
/// The thread sleeps at least as long as requested, which is what the bit-banged protocols
/// need: every delay is a minimum, never a target.
#[derive(Copy, Clone, Debug, Default)]
pub struct SleepDelay;

impl DelayNs for SleepDelay {
    fn delay_ns(&mut self, ns: u32) {
        sleep(Duration::from_nanos(ns.into()));
    }

    fn delay_us(&mut self, us: u32) {
        sleep(Duration::from_micros(us.into()));
    }

    fn delay_ms(&mut self, ms: u32) {
        sleep(Duration::from_millis(ms.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn sleeps_at_least_the_requested_time() {
        let mut delay = SleepDelay;
        let start = Instant::now();
        delay.delay_us(500);
        assert!(start.elapsed() >= Duration::from_micros(500));
    }
}
