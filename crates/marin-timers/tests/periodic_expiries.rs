use marin_timers::{PeriodicTimer, TimerMode};
use proptest::prelude::*;

const HZ: u64 = 50_000_000;

fn ns_for_ticks(ticks: u64) -> u64 {
    ((ticks as u128) * 1_000_000_000u128).div_ceil(HZ as u128) as u64
}

proptest! {
    #[test]
    fn expiry_count_does_not_depend_on_advance_granularity(
        limit in 1u64..5_000,
        k in 0u64..50,
        steps in proptest::collection::vec(1u64..2_000_000, 1..20),
    ) {
        let end_ns = ns_for_ticks(k * limit);

        let mut single = PeriodicTimer::new(HZ);
        single.set_limit(limit, true, 0);
        single.run(TimerMode::Periodic, 0);
        prop_assert_eq!(single.advance(end_ns), k);

        let mut stepped = PeriodicTimer::new(HZ);
        stepped.set_limit(limit, true, 0);
        stepped.run(TimerMode::Periodic, 0);
        let mut now = 0u64;
        let mut total = 0u64;
        for step in steps {
            now = (now + step).min(end_ns);
            total += stepped.advance(now);
        }
        total += stepped.advance(end_ns);
        prop_assert_eq!(total, k);
    }

    #[test]
    fn count_never_exceeds_limit_while_periodic(
        limit in 1u64..10_000,
        now in 0u64..10_000_000,
    ) {
        let mut t = PeriodicTimer::new(HZ);
        t.set_limit(limit, true, 0);
        t.run(TimerMode::Periodic, 0);
        t.advance(now);
        let count = t.count(now);
        prop_assert!(count >= 1 && count <= limit);
    }
}
