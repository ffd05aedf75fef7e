use std::cell::RefCell;
use std::rc::Rc;

use marin_devices::timer::MARIN_TIMER_HZ;
use marin_devices::{IrqLine, MarinTimer};
use marin_timers::TimerMode;

#[derive(Clone, Default)]
struct TestIrqLine(Rc<RefCell<Vec<bool>>>);

impl IrqLine for TestIrqLine {
    fn set_level(&self, level: bool) {
        self.0.borrow_mut().push(level);
    }
}

fn ns_for_ticks(ticks: u64) -> u64 {
    ((ticks as u128) * 1_000_000_000u128).div_ceil(u128::from(MARIN_TIMER_HZ)) as u64
}

#[test]
fn periodic_timer_asserts_once_per_period() {
    for (limit, k) in [(1u64, 1u64), (7, 3), (50_000, 10), (123_457, 4)] {
        let irq = TestIrqLine::default();
        let mut timer = MarinTimer::new(Box::new(irq.clone()));
        timer.timer_mut().set_limit(limit, true, 0);
        timer.timer_mut().run(TimerMode::Periodic, 0);

        assert_eq!(timer.advance(ns_for_ticks(k * limit)), k);
        assert_eq!(irq.0.borrow().len() as u64, k);

        // One tick short of the next period: nothing more.
        assert_eq!(timer.advance(ns_for_ticks((k + 1) * limit - 1)), 0);
        assert_eq!(irq.0.borrow().len() as u64, k);
    }
}

#[test]
fn frequency_is_fixed_at_50_mhz() {
    let timer = MarinTimer::new(Box::new(TestIrqLine::default()));
    assert_eq!(timer.timer().freq_hz(), 50_000_000);
}
