//! Marin timer: a 50 MHz countdown whose expiries assert one interrupt output.
//!
//! There are no guest-visible registers. The countdown itself is programmed by the host through
//! [`MarinTimer::timer_mut`].

use marin_timers::PeriodicTimer;

use crate::device::MarinDevice;
use crate::irq::IrqLine;

pub const TIMER_TYPE_NAME: &str = "marin_timer";

pub const MARIN_TIMER_HZ: u64 = 50_000_000;

pub struct MarinTimer {
    timer: PeriodicTimer,
    irq: Box<dyn IrqLine>,
}

impl MarinTimer {
    pub fn new(irq: Box<dyn IrqLine>) -> Self {
        Self {
            timer: PeriodicTimer::new(MARIN_TIMER_HZ),
            irq,
        }
    }

    pub fn timer(&self) -> &PeriodicTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut PeriodicTimer {
        &mut self.timer
    }

    /// Runs the countdown up to `now_ns`, asserting the output once per expiry.
    pub fn advance(&mut self, now_ns: u64) -> u64 {
        let expiries = self.timer.advance(now_ns);
        for _ in 0..expiries {
            tracing::trace!(now_ns, "marin_timer: expired");
            self.irq.set_level(true);
        }
        expiries
    }
}

impl MarinDevice for MarinTimer {
    fn type_name(&self) -> &'static str {
        TIMER_TYPE_NAME
    }

    fn read(&mut self, offset: u64, size: usize) -> u64 {
        tracing::warn!(offset, size, "marin_timer: device has no registers");
        0
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        tracing::warn!(offset, size, value, "marin_timer: device has no registers");
    }

    fn reset(&mut self) {
        self.timer.reset();
    }
}
