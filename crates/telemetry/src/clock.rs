use chrono::{DateTime, TimeDelta, Utc};

/// Wall clock that never repeats or goes backwards.
///
/// Each reading is at least one microsecond after the previous one, so
/// records stamped in encode order stay ordered even if the system clock
/// stalls or is stepped back.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the system clock.
    pub fn now(&mut self) -> DateTime<Utc> {
        self.observe(Utc::now())
    }

    /// Feeds a wall-clock reading and returns the clamped timestamp.
    pub fn observe(&mut self, wall: DateTime<Utc>) -> DateTime<Utc> {
        let next = match self.last {
            Some(last) if wall <= last => last + TimeDelta::microseconds(1),
            _ => wall,
        };
        self.last = Some(next);
        next
    }
}
