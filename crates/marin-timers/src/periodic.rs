const NANOS_PER_SEC: u128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Reload from the limit on every expiry.
    Periodic,
    /// Stop after the first expiry.
    OneShot,
}

/// A down-counter ticking at `freq_hz`, evaluated lazily against guest time.
///
/// The counter does not run on its own: callers pass the current guest time to
/// [`PeriodicTimer::advance`], which reports how many expiries happened since the previous call.
/// While running, the next expiry is kept as an absolute tick offset from the instant the
/// counter was last (re)anchored, so periodic expiries do not drift.
#[derive(Debug, Clone)]
pub struct PeriodicTimer {
    freq_hz: u64,
    limit: u64,
    /// Counter value while stopped.
    count: u64,
    running: Option<TimerMode>,
    anchor_ns: u64,
    next_expiry_tick: u64,
}

impl PeriodicTimer {
    pub fn new(freq_hz: u64) -> Self {
        Self {
            freq_hz: checked_freq(freq_hz),
            limit: 0,
            count: 0,
            running: None,
            anchor_ns: 0,
            next_expiry_tick: 0,
        }
    }

    pub fn freq_hz(&self) -> u64 {
        self.freq_hz
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn mode(&self) -> Option<TimerMode> {
        self.running
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    fn ticks_from_ns(&self, ns: u64) -> u64 {
        let ticks = (ns as u128) * (self.freq_hz as u128) / NANOS_PER_SEC;
        ticks.min(u64::MAX as u128) as u64
    }

    fn ns_from_ticks_ceil(&self, ticks: u64) -> u64 {
        let numer = (ticks as u128) * NANOS_PER_SEC;
        let denom = self.freq_hz as u128;
        numer.div_ceil(denom).min(u64::MAX as u128) as u64
    }

    fn elapsed_ticks(&self, now_ns: u64) -> u64 {
        self.ticks_from_ns(now_ns.saturating_sub(self.anchor_ns))
    }

    /// Current counter value.
    pub fn count(&self, now_ns: u64) -> u64 {
        if self.running.is_some() {
            self.next_expiry_tick
                .saturating_sub(self.elapsed_ticks(now_ns))
        } else {
            self.count
        }
    }

    /// Guest time of the next expiry, if running.
    pub fn next_deadline_ns(&self) -> Option<u64> {
        self.running?;
        Some(
            self.anchor_ns
                .saturating_add(self.ns_from_ticks_ceil(self.next_expiry_tick)),
        )
    }

    fn reanchor(&mut self, now_ns: u64, count: u64) {
        self.anchor_ns = now_ns;
        self.next_expiry_tick = count;
    }

    /// Changes the tick rate, keeping the current counter value.
    pub fn set_freq(&mut self, freq_hz: u64, now_ns: u64) {
        let count = self.count(now_ns);
        self.freq_hz = checked_freq(freq_hz);
        if self.running.is_some() {
            self.reanchor(now_ns, count);
        }
    }

    pub fn set_count(&mut self, count: u64, now_ns: u64) {
        if self.running.is_some() {
            self.reanchor(now_ns, count);
        } else {
            self.count = count;
        }
    }

    /// Sets the reload value. With `reload` the counter is also loaded with `limit` now.
    pub fn set_limit(&mut self, limit: u64, reload: bool, now_ns: u64) {
        self.limit = limit;
        if reload {
            self.set_count(limit, now_ns);
        }
    }

    /// Starts counting down from the current counter value. Changing the mode of a running
    /// timer keeps its deadline.
    pub fn run(&mut self, mode: TimerMode, now_ns: u64) {
        if self.running.is_none() {
            self.reanchor(now_ns, self.count);
        }
        self.running = Some(mode);
    }

    /// Freezes the counter at its current value.
    pub fn stop(&mut self, now_ns: u64) {
        if self.running.is_some() {
            self.count = self.count(now_ns);
            self.running = None;
        }
    }

    /// Stops the timer and clears limit and counter. The tick rate is kept.
    pub fn reset(&mut self) {
        self.limit = 0;
        self.count = 0;
        self.running = None;
        self.anchor_ns = 0;
        self.next_expiry_tick = 0;
    }

    /// Returns the number of expiries between the previous call and `now_ns`.
    pub fn advance(&mut self, now_ns: u64) -> u64 {
        let Some(mode) = self.running else {
            return 0;
        };
        let elapsed = self.elapsed_ticks(now_ns);
        if elapsed < self.next_expiry_tick {
            return 0;
        }

        match mode {
            TimerMode::OneShot => {
                self.count = 0;
                self.running = None;
                1
            }
            TimerMode::Periodic if self.limit == 0 => {
                tracing::warn!("periodic timer with zero limit, disabling");
                self.count = 0;
                self.running = None;
                1
            }
            TimerMode::Periodic => {
                let expiries = 1 + (elapsed - self.next_expiry_tick) / self.limit;
                self.next_expiry_tick = self
                    .next_expiry_tick
                    .saturating_add(expiries.saturating_mul(self.limit));
                expiries
            }
        }
    }
}

fn checked_freq(freq_hz: u64) -> u64 {
    if freq_hz == 0 {
        tracing::warn!("timer frequency of 0 Hz, using 1 Hz");
        1
    } else {
        freq_hz
    }
}
