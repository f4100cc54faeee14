//! the timer primitive the engine arms, one entry per armed countdown
//!
//! timers are ordered by due instant and then by creation order, firing order of timers due at
//! the same instant is otherwise not something callers should rely on

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::trigger::TriggerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

/// a timer taken off the queue because it was due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub handle: TimerHandle,
    pub trigger: TriggerId,
    pub due: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct TimerQueue {
    next_handle: u64,
    queue: BTreeMap<(DateTime<Utc>, TimerHandle), TriggerId>,
    due_at: HashMap<TimerHandle, DateTime<Utc>>,
}

impl TimerQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, due: DateTime<Utc>, trigger: TriggerId) -> TimerHandle {
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        self.queue.insert((due, handle), trigger);
        self.due_at.insert(handle, due);
        handle
    }

    /// returns false if the timer already fired or was cancelled
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.due_at
            .remove(&handle)
            .and_then(|due| self.queue.remove(&(due, handle)))
            .is_some()
    }

    /// takes the earliest timer that is due at `now`
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Expired> {
        let (&(due, handle), _) = self.queue.first_key_value()?;
        if due > now {
            return None;
        }
        self.due_at.remove(&handle);
        self.queue.remove(&(due, handle)).map(|trigger| Expired {
            handle,
            trigger,
            due,
        })
    }

    #[must_use]
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(due, _)| *due)
    }

    #[must_use]
    pub fn due_at(&self, handle: TimerHandle) -> Option<DateTime<Utc>> {
        self.due_at.get(&handle).copied()
    }

    /// how many live timers point at `trigger`
    #[must_use]
    pub fn armed_for(&self, trigger: TriggerId) -> usize {
        self.queue.values().filter(|id| **id == trigger).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.due_at.clear();
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    #[test]
    fn pops_in_due_order() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let (a, b) = (TriggerId::new(), TriggerId::new());
        let mut timers = TimerQueue::new();
        timers.arm(now + Duration::seconds(10), a);
        timers.arm(now + Duration::seconds(5), b);

        assert_eq!(timers.next_due(), Some(now + Duration::seconds(5)));
        assert!(timers.pop_due(now).is_none());
        let first = timers.pop_due(now + Duration::seconds(20)).unwrap();
        assert_eq!((first.trigger, first.due), (b, now + Duration::seconds(5)));
        assert_eq!(timers.pop_due(now + Duration::seconds(20)).map(|e| e.trigger), Some(a));
        assert!(timers.is_empty());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id = TriggerId::new();
        let mut timers = TimerQueue::new();
        let handle = timers.arm(now, id);
        assert_eq!(timers.armed_for(id), 1);
        assert!(timers.cancel(handle));
        assert!(!timers.cancel(handle));
        assert_eq!(timers.armed_for(id), 0);
        assert!(timers.pop_due(now + Duration::days(1)).is_none());
    }
}
