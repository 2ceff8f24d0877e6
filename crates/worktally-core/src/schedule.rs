//! Daily trigger for the evaluation run

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use worktally_util::WallClock;

/// Fires once per UTC day at a fixed wall-clock time.
///
/// The trigger never fires for an instant at or before the one it was
/// created (or rescheduled) at, so a restart does not re-run today's slot.
#[derive(Debug, Clone)]
pub struct DailyTrigger {
    run_at: WallClock,
    next: DateTime<Utc>,
}

impl DailyTrigger {
    pub fn new(run_at: WallClock, now: DateTime<Utc>) -> Self {
        Self {
            run_at,
            next: next_run_after(run_at, now),
        }
    }

    pub fn run_at(&self) -> WallClock {
        self.run_at
    }

    /// The next instant this trigger fires at
    pub fn next(&self) -> DateTime<Utc> {
        self.next
    }

    /// Returns the due instant and advances to the following day once `now`
    /// has reached it. Missed slots collapse into a single firing.
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if now < self.next {
            return None;
        }
        let fired = self.next;
        self.next = next_run_after(self.run_at, now);
        debug!(fired = %fired, next = %self.next, "Daily trigger fired");
        Some(fired)
    }

    /// Change the wall-clock time, e.g. after a config reload
    pub fn reschedule(&mut self, run_at: WallClock, now: DateTime<Utc>) {
        self.run_at = run_at;
        self.next = next_run_after(run_at, now);
    }
}

/// First `run_at` instant strictly after `now`
pub fn next_run_after(run_at: WallClock, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = run_at.on(now.date_naive());
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::at;

    fn clock(h: u8, m: u8) -> WallClock {
        WallClock::new(h, m).unwrap()
    }

    #[test]
    fn next_run_same_day_or_tomorrow() {
        assert_eq!(next_run_after(clock(23, 59), at(10, 12, 0)), at(10, 23, 59));
        assert_eq!(next_run_after(clock(23, 59), at(10, 23, 59)), at(11, 23, 59));
        assert_eq!(next_run_after(clock(0, 5), at(10, 0, 0)), at(10, 0, 5));
    }

    #[test]
    fn poll_fires_once_per_slot() {
        let mut trigger = DailyTrigger::new(clock(23, 59), at(10, 12, 0));
        assert_eq!(trigger.poll(at(10, 23, 58)), None);
        assert_eq!(trigger.poll(at(10, 23, 59)), Some(at(10, 23, 59)));
        assert_eq!(trigger.poll(at(10, 23, 59)), None);
        assert_eq!(trigger.next(), at(11, 23, 59));
    }

    #[test]
    fn missed_slots_collapse() {
        let mut trigger = DailyTrigger::new(clock(6, 0), at(10, 12, 0));
        assert_eq!(trigger.poll(at(14, 7, 0)), Some(at(11, 6, 0)));
        assert_eq!(trigger.next(), at(15, 6, 0));
    }

    #[test]
    fn reschedule_moves_next() {
        let mut trigger = DailyTrigger::new(clock(23, 59), at(10, 12, 0));
        trigger.reschedule(clock(13, 0), at(10, 12, 0));
        assert_eq!(trigger.next(), at(10, 13, 0));
        assert_eq!(trigger.run_at(), clock(13, 0));
    }
}
