use std::{fmt, str::FromStr};

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{Error, Result},
    schedule::{after_delay, DailyTime},
};

/// stable across reloads, assigned when the trigger is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(Uuid);

impl TriggerId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TriggerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TriggerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    OneShot,
    DailyRecurring,
}

/// a resolved schedule, this is what gets persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    Daily(DailyTime),
    Once { at: DateTime<Utc> },
}

/// a schedule as a caller asks for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// every day at this local time
    Daily(DailyTime),
    /// once, at an absolute instant
    At(DateTime<Utc>),
    /// once, this long after the trigger is created
    After(Duration),
}

impl ScheduleSpec {
    #[must_use]
    pub const fn daily(hour: u8, minute: u8) -> Self {
        Self::Daily(DailyTime { hour, minute })
    }

    /// relative delays are pinned to an absolute instant here so they survive reloads
    ///
    /// # Errors
    /// if the time of day is out of range or the delay is negative or too long
    pub fn resolve(self, now: DateTime<Utc>) -> Result<Schedule> {
        match self {
            Self::Daily(time) => Ok(Schedule::Daily(time.validate()?)),
            Self::At(at) => Ok(Schedule::Once { at }),
            Self::After(delay) if delay < Duration::zero() => Err(Error::InvalidSchedule(
                format!("delay of {} seconds is negative", delay.num_seconds()),
            )),
            Self::After(delay) => Ok(Schedule::Once {
                at: after_delay(now, delay)?,
            }),
        }
    }
}

/// what a reminder is about, decides the notification title and a default body
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReminderKind {
    #[default]
    Alarm,
    Hydration,
    Appointment {
        reference: String,
        starts_at: DateTime<Utc>,
    },
    /// a short lived copy of another trigger
    Snooze { of: TriggerId },
}

#[inline]
#[must_use]
pub const fn always_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertOptions {
    #[serde(default = "always_true")]
    pub sound: bool,
    #[serde(default = "always_true")]
    pub vibration: bool,
    /// falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snooze_minutes: Option<u32>,
}

impl Default for AlertOptions {
    fn default() -> Self {
        Self {
            sound: true,
            vibration: true,
            snooze_minutes: None,
        }
    }
}

/// everything needed to create a trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOptions {
    pub schedule: ScheduleSpec,
    pub label: Option<String>,
    pub alert: AlertOptions,
    pub reminder: ReminderKind,
}

impl TriggerOptions {
    #[must_use]
    pub fn new(schedule: ScheduleSpec) -> Self {
        Self {
            schedule,
            label: None,
            alert: AlertOptions::default(),
            reminder: ReminderKind::default(),
        }
    }

    #[must_use]
    pub fn daily(hour: u8, minute: u8) -> Self {
        Self::new(ScheduleSpec::daily(hour, minute))
    }

    #[must_use]
    pub fn at(instant: DateTime<Utc>) -> Self {
        Self::new(ScheduleSpec::At(instant))
    }

    #[must_use]
    pub fn after(delay: Duration) -> Self {
        Self::new(ScheduleSpec::After(delay))
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn sound(mut self, sound: bool) -> Self {
        self.alert.sound = sound;
        self
    }

    #[must_use]
    pub fn vibration(mut self, vibration: bool) -> Self {
        self.alert.vibration = vibration;
        self
    }

    #[must_use]
    pub fn snooze_minutes(mut self, minutes: u32) -> Self {
        self.alert.snooze_minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn kind(mut self, reminder: ReminderKind) -> Self {
        self.reminder = reminder;
        self
    }
}

/// a single change to an existing trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEdit {
    Schedule(ScheduleSpec),
    Label(Option<String>),
    Sound(bool),
    Vibration(bool),
    SnoozeMinutes(Option<u32>),
}

/// the unit of scheduling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: TriggerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "always_true")]
    pub active: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fired_at: Option<DateTime<Utc>>,
    pub schedule: Schedule,
    #[serde(default)]
    pub reminder: ReminderKind,
    #[serde(default)]
    pub alert: AlertOptions,
}

impl Trigger {
    /// # Errors
    /// [`Error::InvalidSchedule`] for a bad schedule, [`Error::EmptyPayload`] if there is
    /// nothing to show when it fires
    pub fn from_options(id: TriggerId, options: TriggerOptions, now: DateTime<Utc>) -> Result<Self> {
        let trigger = Self {
            id,
            label: options.label.filter(|label| !label.trim().is_empty()),
            active: true,
            created_at: now,
            last_fired_at: None,
            schedule: options.schedule.resolve(now)?,
            reminder: options.reminder,
            alert: options.alert,
        };
        trigger.validate()
    }

    /// applies `edits` to a copy, the original is untouched if any edit is invalid
    ///
    /// # Errors
    /// same as [`Trigger::from_options`]
    pub fn edited(&self, edits: impl IntoIterator<Item = TriggerEdit>, now: DateTime<Utc>) -> Result<Self> {
        let mut trigger = self.clone();
        for edit in edits {
            match edit {
                TriggerEdit::Schedule(schedule) => trigger.schedule = schedule.resolve(now)?,
                TriggerEdit::Label(label) => {
                    trigger.label = label.filter(|label| !label.trim().is_empty());
                }
                TriggerEdit::Sound(sound) => trigger.alert.sound = sound,
                TriggerEdit::Vibration(vibration) => trigger.alert.vibration = vibration,
                TriggerEdit::SnoozeMinutes(minutes) => trigger.alert.snooze_minutes = minutes,
            }
        }
        trigger.validate()
    }

    /// # Errors
    /// if the stored schedule is out of range or there is no body to show
    pub fn validate(self) -> Result<Self> {
        if let Schedule::Daily(time) = self.schedule {
            time.validate()?;
        }
        if self.body().is_none() {
            return Err(Error::EmptyPayload);
        }
        Ok(self)
    }

    #[must_use]
    pub const fn kind(&self) -> TriggerKind {
        match self.schedule {
            Schedule::Daily(_) => TriggerKind::DailyRecurring,
            Schedule::Once { .. } => TriggerKind::OneShot,
        }
    }

    #[must_use]
    pub fn title(&self) -> String {
        match &self.reminder {
            ReminderKind::Alarm => "Alarm".to_string(),
            ReminderKind::Hydration => "Hydration reminder".to_string(),
            ReminderKind::Appointment { .. } => "Upcoming appointment".to_string(),
            ReminderKind::Snooze { .. } => "Snoozed reminder".to_string(),
        }
    }

    /// the label if there is one, otherwise whatever the kind can say about itself
    #[must_use]
    pub fn body(&self) -> Option<String> {
        if let Some(label) = &self.label {
            return Some(label.clone());
        }
        match &self.reminder {
            ReminderKind::Hydration => Some("Time to drink a glass of water".to_string()),
            ReminderKind::Appointment {
                reference,
                starts_at,
            } => Some(format!(
                "Appointment {reference} starts at {}",
                starts_at.with_timezone(&Local).format("%a %H:%M")
            )),
            ReminderKind::Alarm | ReminderKind::Snooze { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn relative_delay_is_pinned_at_creation() {
        let trigger = Trigger::from_options(
            TriggerId::new(),
            TriggerOptions::after(Duration::minutes(30)).label("tea"),
            now(),
        )
        .unwrap();
        assert_eq!(trigger.kind(), TriggerKind::OneShot);
        assert_eq!(
            trigger.schedule,
            Schedule::Once {
                at: now() + Duration::minutes(30)
            }
        );
    }

    #[test]
    fn negative_delay_is_rejected() {
        let result = Trigger::from_options(
            TriggerId::new(),
            TriggerOptions::after(Duration::minutes(-1)).label("tea"),
            now(),
        );
        assert!(matches!(result, Err(Error::InvalidSchedule(_))));
    }

    #[test]
    fn alarm_without_label_is_empty() {
        let result = Trigger::from_options(TriggerId::new(), TriggerOptions::daily(7, 0), now());
        assert!(matches!(result, Err(Error::EmptyPayload)));

        let blank = Trigger::from_options(TriggerId::new(), TriggerOptions::daily(7, 0).label("  "), now());
        assert!(matches!(blank, Err(Error::EmptyPayload)));
    }

    #[test]
    fn hydration_derives_its_body() {
        let trigger = Trigger::from_options(
            TriggerId::new(),
            TriggerOptions::daily(10, 0).kind(ReminderKind::Hydration),
            now(),
        )
        .unwrap();
        assert_eq!(trigger.title(), "Hydration reminder");
        assert_eq!(trigger.body().as_deref(), Some("Time to drink a glass of water"));
        assert_eq!(trigger.kind(), TriggerKind::DailyRecurring);
    }

    #[test]
    fn invalid_edit_leaves_original_alone() {
        let trigger = Trigger::from_options(TriggerId::new(), TriggerOptions::daily(7, 0).label("wake"), now())
            .unwrap();
        let result = trigger.edited(
            [
                TriggerEdit::Label(Some("get up".to_string())),
                TriggerEdit::Schedule(ScheduleSpec::daily(25, 0)),
            ],
            now(),
        );
        assert!(matches!(result, Err(Error::InvalidSchedule(_))));
        assert_eq!(trigger.label.as_deref(), Some("wake"));
    }

    #[test]
    fn edits_merge_fields() {
        let trigger = Trigger::from_options(TriggerId::new(), TriggerOptions::daily(7, 0).label("wake"), now())
            .unwrap();
        let edited = trigger
            .edited([TriggerEdit::Sound(false), TriggerEdit::SnoozeMinutes(Some(10))], now())
            .unwrap();
        assert!(!edited.alert.sound);
        assert!(edited.alert.vibration);
        assert_eq!(edited.alert.snooze_minutes, Some(10));
        assert_eq!(edited.id, trigger.id);
        assert_eq!(edited.label.as_deref(), Some("wake"));
    }

    #[test]
    fn ids_parse_back() {
        let id = TriggerId::new();
        assert_eq!(id.to_string().parse::<TriggerId>().unwrap(), id);
    }
}
