//! Host clock read by a [`BridgeNode`](crate::node::BridgeNode) when a
//! sample is delivered.

use chrono::Utc;
use px4bridge_types::Time;

pub trait Clock: Send + Sync {
    fn now(&self) -> Time;
}

/// Wall clock (UTC, Unix epoch).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Time {
        let now = Utc::now();
        match now.timestamp_nanos_opt() {
            Some(nanos) => Time::from_nanos(nanos),
            None => Time::new(i32::MAX, now.timestamp_subsec_nanos()),
        }
    }
}

/// A clock frozen at one instant, for replays and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FixedClock(pub Time);

impl Clock for FixedClock {
    fn now(&self) -> Time {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_past_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now().sec > 1_577_836_800);
    }

    #[test]
    fn fixed_clock_never_moves() {
        let clock = FixedClock(Time::new(42, 7));
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), Time::new(42, 7));
    }
}
