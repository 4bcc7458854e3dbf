//! Edge-triggered periodic scheduling primitive
//!
//! A [`PeriodicTrigger`] raises a one-shot "elapsed" flag at every period
//! boundary. Reading the flag clears it, so any number of periods that pass
//! while nobody looks are coalesced into a single fire.
//!
//! The periodic source is software: the scheduling pass calls
//! [`PeriodicTrigger::poll`] with the current time. A failed acquisition
//! raises the flag again through [`PeriodicTrigger::reset`], which only needs
//! a shared reference.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_time::{Duration, Instant};

/// Initial (or forced) state of the elapsed flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// The flag is raised, so the next read reports a fire
    Started,
    /// The flag is clear
    Stopped,
}

#[derive(Debug)]
pub struct PeriodicTrigger {
    period: Duration,
    /// Next period boundary while armed, `None` while stopped
    deadline: Option<Instant>,
    elapsed: AtomicBool,
}

impl PeriodicTrigger {
    /// Create a disarmed trigger.
    ///
    /// `initial` decides whether the first read after construction already
    /// reports a fire, which is how cadences get an immediate first sample.
    pub fn new(period: Duration, initial: TriggerState) -> Self {
        // A zero period would never advance the deadline.
        let period = if period.as_ticks() == 0 {
            Duration::from_ticks(1)
        } else {
            period
        };

        Self {
            period,
            deadline: None,
            elapsed: AtomicBool::new(initial == TriggerState::Started),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Arm periodic firing, first boundary one period from `now`.
    pub fn start(&mut self, now: Instant) {
        self.deadline = Some(now + self.period);
    }

    /// Disarm and clear any pending fire.
    pub fn stop(&mut self) {
        self.deadline = None;
        self.elapsed.store(false, Ordering::Relaxed);
    }

    /// Return and clear the pending flag.
    pub fn is_elapsed(&self) -> bool {
        self.elapsed.swap(false, Ordering::Relaxed)
    }

    /// Force the flag to a known value without touching the period.
    pub fn reset(&self, state: TriggerState) {
        self.elapsed
            .store(state == TriggerState::Started, Ordering::Relaxed);
    }

    /// Move the next boundary to `now + delay` without raising the flag.
    ///
    /// Used for short retries after a failed acquisition. Regular spacing
    /// resumes from the rescheduled boundary.
    pub fn reschedule(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    /// Drive the periodic source.
    ///
    /// Raises the flag if at least one boundary passed since the last call and
    /// moves the deadline past `now`. Missed boundaries are not queued.
    pub fn poll(&mut self, now: Instant) {
        let Some(deadline) = self.deadline else {
            return;
        };
        if now < deadline {
            return;
        }

        let missed = (now - deadline).as_ticks() / self.period.as_ticks();
        self.deadline = Some(deadline + Duration::from_ticks(self.period.as_ticks() * (missed + 1)));
        self.elapsed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn single_period_fires_once() {
        let mut trigger = PeriodicTrigger::new(Duration::from_millis(1000), TriggerState::Stopped);
        trigger.start(at(0));

        trigger.poll(at(500));
        assert!(!trigger.is_elapsed());

        trigger.poll(at(1000));
        assert!(trigger.is_elapsed());
        assert!(!trigger.is_elapsed(), "second read in the same period must be false");

        trigger.poll(at(1500));
        assert!(!trigger.is_elapsed());

        trigger.poll(at(2000));
        assert!(trigger.is_elapsed());
    }

    #[test]
    fn missed_periods_are_coalesced() {
        let mut trigger = PeriodicTrigger::new(Duration::from_millis(100), TriggerState::Stopped);
        trigger.start(at(0));

        trigger.poll(at(1050));
        assert!(trigger.is_elapsed());
        assert!(!trigger.is_elapsed());

        // Next boundary is 1100, not one of the skipped ones.
        trigger.poll(at(1099));
        assert!(!trigger.is_elapsed());
        trigger.poll(at(1100));
        assert!(trigger.is_elapsed());
    }

    #[test]
    fn started_initial_state_fires_immediately() {
        let trigger = PeriodicTrigger::new(Duration::from_secs(60), TriggerState::Started);
        assert!(trigger.is_elapsed());
        assert!(!trigger.is_elapsed());
    }

    #[test]
    fn stop_disarms_and_clears() {
        let mut trigger = PeriodicTrigger::new(Duration::from_millis(10), TriggerState::Started);
        trigger.start(at(0));
        trigger.stop();
        assert!(trigger.deadline.is_none());
        assert!(!trigger.is_elapsed());

        trigger.poll(at(1000));
        assert!(!trigger.is_elapsed());
    }

    #[test]
    fn reset_forces_flag_and_keeps_period() {
        let mut trigger = PeriodicTrigger::new(Duration::from_millis(250), TriggerState::Stopped);
        trigger.start(at(0));
        trigger.reset(TriggerState::Started);
        assert!(trigger.is_elapsed());
        assert_eq!(trigger.period(), Duration::from_millis(250));

        trigger.reset(TriggerState::Started);
        trigger.reset(TriggerState::Stopped);
        assert!(!trigger.is_elapsed());
    }

    #[test]
    fn reschedule_shortens_next_boundary() {
        let mut trigger = PeriodicTrigger::new(Duration::from_secs(60), TriggerState::Stopped);
        trigger.start(at(0));
        trigger.reschedule(at(1_000), Duration::from_secs(10));

        trigger.poll(at(10_999));
        assert!(!trigger.is_elapsed());
        trigger.poll(at(11_000));
        assert!(trigger.is_elapsed());

        // Regular spacing resumes from the retry boundary.
        trigger.poll(at(70_999));
        assert!(!trigger.is_elapsed());
        trigger.poll(at(71_000));
        assert!(trigger.is_elapsed());
    }
}
