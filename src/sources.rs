//! pollers that turn outside data into reminders
//!
//! sources only decide what to remind about, the engine does the scheduling

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use log::debug;

use crate::{
    schedule::DailyTime,
    trigger::{ReminderKind, ScheduleSpec, TriggerOptions},
};

pub trait ReminderSource {
    fn name(&self) -> &str;

    /// reminders to register, called periodically
    fn poll(&mut self, now: DateTime<Utc>) -> Vec<TriggerOptions>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appointment {
    pub reference: String,
    pub title: Option<String>,
    pub starts_at: DateTime<Utc>,
}

/// the external query for upcoming appointments
pub trait AppointmentFeed {
    fn upcoming(&mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<Appointment>;
}

impl<F> AppointmentFeed for F
where
    F: FnMut(DateTime<Utc>, DateTime<Utc>) -> Vec<Appointment>,
{
    fn upcoming(&mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<Appointment> {
        self(from, until)
    }
}

/// one reminder per upcoming appointment, `lead` before it starts
#[derive(Debug)]
pub struct AppointmentReminders<F> {
    feed: F,
    look_ahead: Duration,
    lead: Duration,
    seen: HashSet<String>,
}

impl<F: AppointmentFeed> AppointmentReminders<F> {
    pub fn new(feed: F) -> Self {
        Self {
            feed,
            look_ahead: Duration::hours(24),
            lead: Duration::hours(1),
            seen: HashSet::new(),
        }
    }

    #[must_use]
    pub fn look_ahead(mut self, look_ahead: Duration) -> Self {
        self.look_ahead = look_ahead;
        self
    }

    #[must_use]
    pub fn lead(mut self, lead: Duration) -> Self {
        self.lead = lead;
        self
    }
}

impl<F: AppointmentFeed> ReminderSource for AppointmentReminders<F> {
    fn name(&self) -> &str {
        "appointments"
    }

    fn poll(&mut self, now: DateTime<Utc>) -> Vec<TriggerOptions> {
        let upcoming = self.feed.upcoming(now, now + self.look_ahead);
        let mut reminders = Vec::new();
        for appointment in upcoming {
            if appointment.starts_at <= now || !self.seen.insert(appointment.reference.clone()) {
                continue;
            }
            debug!("reminding about appointment {}", appointment.reference);
            let remind_at = (appointment.starts_at - self.lead).max(now);
            let mut options = TriggerOptions::at(remind_at).kind(ReminderKind::Appointment {
                reference: appointment.reference,
                starts_at: appointment.starts_at,
            });
            options.label = appointment.title;
            reminders.push(options);
        }
        reminders
    }
}

/// daily drink reminders every `every` between `first` and `last`
#[derive(Debug, Clone)]
pub struct HydrationPlan {
    first: DailyTime,
    last: DailyTime,
    every: Duration,
    registered: bool,
}

impl HydrationPlan {
    #[must_use]
    pub const fn new(first: DailyTime, last: DailyTime, every: Duration) -> Self {
        Self {
            first,
            last,
            every,
            registered: false,
        }
    }

    /// the times of day a reminder goes off, `last` is included if the interval lands on it
    #[must_use]
    pub fn times(&self) -> Vec<DailyTime> {
        let step = self.every.num_minutes();
        if step <= 0 {
            return vec![self.first];
        }
        let start = i64::from(self.first.hour) * 60 + i64::from(self.first.minute);
        let end = i64::from(self.last.hour) * 60 + i64::from(self.last.minute);
        (0..)
            .map(|n| start + n * step)
            .take_while(|minutes| *minutes <= end)
            .filter_map(|minutes| {
                let hour = u8::try_from(minutes / 60).ok()?;
                let minute = u8::try_from(minutes % 60).ok()?;
                DailyTime::new(hour, minute).ok()
            })
            .collect()
    }
}

impl ReminderSource for HydrationPlan {
    fn name(&self) -> &str {
        "hydration"
    }

    fn poll(&mut self, _now: DateTime<Utc>) -> Vec<TriggerOptions> {
        if self.registered {
            return Vec::new();
        }
        self.registered = true;
        self.times()
            .into_iter()
            .map(|time| {
                TriggerOptions::new(ScheduleSpec::Daily(time))
                    .kind(ReminderKind::Hydration)
                    .sound(false)
            })
            .collect()
    }
}
