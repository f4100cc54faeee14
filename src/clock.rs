use chrono::{DateTime, Utc};

use crate::schedule::Zone;

/// where the engine gets "now" from
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// calendar that daily reminders are interpreted in
    fn zone(&self) -> Zone {
        Zone::Local
    }
}

/// the real wall clock, daily times are in the system's local time zone
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
