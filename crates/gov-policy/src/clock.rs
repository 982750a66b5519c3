// clock.rs — Wall-clock abstraction.
//
// Rule conditions are evaluated live against the current time, and memory
// retention / update deferral compare against "now". Injecting the clock
// lets tests pin time without sleeping.

use chrono::{DateTime, Local, NaiveDateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant in UTC (timestamps, retention, deferral).
    fn now(&self) -> DateTime<Utc>;

    /// Current local wall-clock time (time-of-day and weekday conditions).
    fn local_now(&self) -> NaiveDateTime {
        self.now().with_timezone(&Local).naive_local()
    }
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a fixed instant. Local time equals UTC so condition
/// tests are independent of the host time zone.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }

    /// Build from a naive local time, treated as UTC.
    pub fn at_local(local: NaiveDateTime) -> Self {
        Self {
            at: local.and_utc(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }

    fn local_now(&self) -> NaiveDateTime {
        self.at.naive_utc()
    }
}
