//! wall clock to instant translation
//!
//! everything here is pure, "now" is always passed in so it can be tested without a real clock

use std::fmt;

use chrono::{
    DateTime, Duration, FixedOffset, Local, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// a time of day in local wall clock time, used by daily reminders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DailyTime {
    pub hour: u8,
    pub minute: u8,
}

impl DailyTime {
    /// # Errors
    /// if hour is not in 0..24 or minute is not in 0..60
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        Self { hour, minute }.validate()
    }

    /// # Errors
    /// if hour is not in 0..24 or minute is not in 0..60
    pub fn validate(self) -> Result<Self> {
        if self.hour > 23 {
            return Err(Error::InvalidSchedule(format!(
                "hour {} is out of range 0-23",
                self.hour
            )));
        }
        if self.minute > 59 {
            return Err(Error::InvalidSchedule(format!(
                "minute {} is out of range 0-59",
                self.minute
            )));
        }
        Ok(self)
    }

    #[must_use]
    pub fn naive(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour.min(23)), u32::from(self.minute.min(59)), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for DailyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// which calendar daily times are interpreted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Local,
    Fixed(FixedOffset),
}

/// next instant strictly after `now` where the wall clock reads `target`.
///
/// Rolls over by one calendar day (not 24 hours) when `target` already passed today,
/// so a daily alarm keeps its wall clock time across daylight saving changes.
pub fn next_fire_time<Tz: TimeZone>(now: &DateTime<Tz>, target: DailyTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let time = target.naive();
    let today = now.date_naive();
    let candidate = at_wall_clock(&tz, today, time);
    if candidate > *now {
        return candidate;
    }
    today
        .succ_opt()
        .map(|tomorrow| at_wall_clock(&tz, tomorrow, time))
        .filter(|candidate| candidate > now)
        .unwrap_or_else(|| now.clone() + Duration::days(1))
}

/// [`next_fire_time`] for an utc instant, interpreting `target` in `zone`
#[must_use]
pub fn next_daily(zone: Zone, now: DateTime<Utc>, target: DailyTime) -> DateTime<Utc> {
    match zone {
        Zone::Local => next_fire_time(&now.with_timezone(&Local), target).with_timezone(&Utc),
        Zone::Fixed(offset) => {
            next_fire_time(&now.with_timezone(&offset), target).with_timezone(&Utc)
        }
    }
}

/// `now + delay`, a negative delay counts as zero
///
/// # Errors
/// if the result is past the end of the representable calendar
pub fn after_delay(now: DateTime<Utc>, delay: Duration) -> Result<DateTime<Utc>> {
    now.checked_add_signed(delay.max(Duration::zero()))
        .ok_or_else(|| {
            Error::InvalidSchedule(format!(
                "delay of {} seconds is too far in the future",
                delay.num_seconds()
            ))
        })
}

fn at_wall_clock<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(instant) => instant,
        // clocks went back, ring the first time the wall clock shows it
        LocalResult::Ambiguous(earliest, _) => earliest,
        // clocks skipped this time, ring at the first minute after the gap
        LocalResult::None => (1..=180)
            .find_map(|minutes| {
                tz.from_local_datetime(&(naive + Duration::minutes(minutes)))
                    .earliest()
            })
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(date: (i32, u32, u32), hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(date.0, date.1, date.2, hour, minute, 0)
            .unwrap()
    }

    #[test]
    fn passed_time_rolls_to_next_day() {
        let now = at((2024, 3, 10), 8, 0);
        let next = next_fire_time(&now, DailyTime::new(7, 0).unwrap());
        assert_eq!(next, at((2024, 3, 11), 7, 0));
    }

    #[test]
    fn later_time_stays_on_same_day() {
        let now = at((2024, 3, 10), 6, 0);
        let next = next_fire_time(&now, DailyTime::new(7, 0).unwrap());
        assert_eq!(next, at((2024, 3, 10), 7, 0));
    }

    #[test]
    fn equal_time_rolls_over() {
        let now = at((2024, 3, 10), 7, 0);
        let next = next_fire_time(&now, DailyTime::new(7, 0).unwrap());
        assert_eq!(next, at((2024, 3, 11), 7, 0));
    }

    #[test]
    fn rolls_over_month_and_year_ends() {
        let now = at((2023, 12, 31), 23, 30);
        let next = next_fire_time(&now, DailyTime::new(0, 15).unwrap());
        assert_eq!(next, at((2024, 1, 1), 0, 15));
    }

    #[test]
    fn always_strictly_after_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 13, 27, 45).unwrap();
        for hour in 0..24 {
            for minute in (0..60).step_by(7) {
                let target = DailyTime::new(hour, minute).unwrap();
                let next = next_fire_time(&now, target);
                assert!(next > now, "{target} gave {next}");
                let same_day = (u32::from(hour), u32::from(minute)) > (13, 27);
                let expected_day = if same_day { 1 } else { 2 };
                assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2024, 6, expected_day).unwrap());
            }
        }
    }

    #[test]
    fn fixed_zone_uses_its_own_calendar() {
        // 23:00 utc is already 01:00 the next day at +02:00
        let zone = Zone::Fixed(FixedOffset::east_opt(2 * 3600).unwrap());
        let now = at((2024, 3, 10), 23, 0);
        let next = next_daily(zone, now, DailyTime::new(7, 0).unwrap());
        assert_eq!(next, at((2024, 3, 11), 5, 0));
    }

    mod daylight_saving {
        use chrono_tz::America::New_York;

        use super::*;

        fn local(now: DateTime<Utc>, target: DailyTime) -> DateTime<Utc> {
            next_fire_time(&now.with_timezone(&New_York), target).with_timezone(&Utc)
        }

        #[test]
        fn skipped_time_rings_right_after_the_gap() {
            // 2024-03-10 02:00 EST jumps to 03:00 EDT, 00:00 EST is 05:00 utc
            let target = DailyTime::new(2, 30).unwrap();
            let next = local(at((2024, 3, 10), 5, 0), target);
            assert_eq!(next, at((2024, 3, 10), 7, 0));

            // and the day after it is back at 02:30 EDT
            assert_eq!(local(next, target), at((2024, 3, 11), 6, 30));
        }

        #[test]
        fn repeated_time_rings_once_on_the_first_pass() {
            // 2024-11-03 02:00 EDT falls back to 01:00 EST, 00:00 EDT is 04:00 utc
            let target = DailyTime::new(1, 30).unwrap();
            let first = local(at((2024, 11, 3), 4, 0), target);
            assert_eq!(first, at((2024, 11, 3), 5, 30));

            // neither the first nor the repeated 01:30 ring again the same day
            assert_eq!(local(first, target), at((2024, 11, 4), 6, 30));
            assert_eq!(local(at((2024, 11, 3), 6, 30), target), at((2024, 11, 4), 6, 30));
        }

        #[test]
        fn rollover_keeps_the_wall_clock_time() {
            // 07:00 EST to 07:00 EDT is only 23 hours
            let target = DailyTime::new(7, 0).unwrap();
            assert_eq!(local(at((2024, 3, 9), 12, 0), target), at((2024, 3, 10), 11, 0));
            // and 25 hours going the other way
            assert_eq!(local(at((2024, 11, 2), 11, 0), target), at((2024, 11, 3), 12, 0));
        }
    }

    #[test]
    fn rejects_out_of_range_times() {
        assert!(matches!(DailyTime::new(24, 0), Err(Error::InvalidSchedule(_))));
        assert!(matches!(DailyTime::new(5, 60), Err(Error::InvalidSchedule(_))));
        assert!(DailyTime::new(23, 59).is_ok());
    }

    #[test]
    fn negative_delay_clamps_to_now() {
        let now = at((2024, 3, 10), 8, 0);
        assert_eq!(after_delay(now, Duration::minutes(-5)).unwrap(), now);
        assert_eq!(
            after_delay(now, Duration::minutes(5)).unwrap(),
            at((2024, 3, 10), 8, 5)
        );
    }

    #[test]
    fn delay_past_the_calendar_is_rejected() {
        let now = at((2024, 3, 10), 8, 0);
        assert!(matches!(
            after_delay(now, Duration::days(1_000_000_000)),
            Err(Error::InvalidSchedule(_))
        ));
    }
}
