//! the reminder engine
//!
//! Every trigger moves through `scheduled -> firing -> rescheduled | consumed`. The engine owns
//! the timer queue and keeps at most one armed timer per trigger: every path that arms a timer
//! cancels the previous one first. The store is the source of truth across restarts, timers are
//! only ever rebuilt from it in [`ReminderEngine::reconcile`].

use std::{
    collections::HashMap,
    sync::mpsc::{self, Receiver, RecvTimeoutError, Sender},
    time::Duration as StdDuration,
};

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};

use crate::{
    audio::{AlarmSound, AudioBackend},
    clock::Clock,
    communication::{EngineHandle, Message},
    config::Config,
    error::Result,
    notify::{Haptics, Interaction, NotificationDispatcher, NotificationSurface},
    schedule::{next_daily, Zone},
    sources::ReminderSource,
    store::{KeyValueStore, TriggerSet, TriggerStore},
    timer::{Expired, TimerHandle, TimerQueue},
    trigger::{
        AlertOptions, ReminderKind, Schedule, Trigger, TriggerEdit, TriggerId, TriggerKind,
        TriggerOptions,
    },
};

/// the longest the run loop sleeps without checking on playing alarms
const MAX_WAIT: StdDuration = StdDuration::from_secs(1);

/// the platform pieces the engine drives
pub struct Capabilities {
    pub clock: Box<dyn Clock>,
    pub store: Box<dyn KeyValueStore>,
    pub audio: Box<dyn AudioBackend>,
    pub notifications: Box<dyn NotificationSurface>,
    /// not every platform can vibrate
    pub haptics: Option<Box<dyn Haptics>>,
}

/// what happens to a trigger once it has fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Rescheduled(DateTime<Utc>),
    Consumed,
}

/// the state transition after a fire, recomputed from the stored schedule every time
#[must_use]
pub fn after_fire(schedule: &Schedule, fired_at: DateTime<Utc>, zone: Zone) -> FireOutcome {
    match schedule {
        Schedule::Daily(time) => FireOutcome::Rescheduled(next_daily(zone, fired_at, *time)),
        Schedule::Once { .. } => FireOutcome::Consumed,
    }
}

/// a snapshot of one trigger for display, without any timer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerSummary {
    pub id: TriggerId,
    pub kind: TriggerKind,
    pub schedule: Schedule,
    pub title: String,
    pub body: String,
    pub reminder: ReminderKind,
    pub alert: AlertOptions,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_fired_at: Option<DateTime<Utc>>,
    /// `None` when the trigger is inactive
    pub next_fire: Option<DateTime<Utc>>,
}

pub struct ReminderEngine {
    clock: Box<dyn Clock>,
    store: TriggerStore<Box<dyn KeyValueStore>>,
    triggers: TriggerSet,
    timers: TimerQueue,
    armed: HashMap<TriggerId, TimerHandle>,
    /// triggers whose alert is going off, as they were when they fired
    alerting: HashMap<TriggerId, Trigger>,
    sound: AlarmSound,
    notifications: NotificationDispatcher,
    haptics: Option<Box<dyn Haptics>>,
    config: Config,
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl ReminderEngine {
    /// builds the engine and rebuilds every timer from the store
    #[must_use]
    pub fn start(capabilities: Capabilities, config: Config) -> Self {
        let mut engine = Self::new(capabilities, config);
        engine.reconcile();
        engine
    }

    /// builds the engine without touching the store, call [`ReminderEngine::reconcile`] to load
    #[must_use]
    pub fn new(capabilities: Capabilities, config: Config) -> Self {
        let (sender, receiver) = mpsc::channel();
        let sound = AlarmSound::new(
            capabilities.audio,
            config.alarm.pattern(),
            config.alarm.ceiling(),
            config.alarm.volume,
        );
        Self {
            clock: capabilities.clock,
            store: TriggerStore::new(capabilities.store, config.storage_key.clone()),
            triggers: TriggerSet::new(),
            timers: TimerQueue::new(),
            armed: HashMap::new(),
            alerting: HashMap::new(),
            sound,
            notifications: NotificationDispatcher::new(capabilities.notifications),
            haptics: capabilities.haptics,
            config,
            sender,
            receiver,
        }
    }

    /// drops every timer and rebuilds them from what is stored, nothing is written back
    pub fn reconcile(&mut self) {
        self.timers.clear();
        self.armed.clear();
        self.triggers = self.store.load_all();
        let active = self
            .triggers
            .iter()
            .filter(|trigger| trigger.active)
            .map(|trigger| trigger.id)
            .collect::<Vec<_>>();
        for id in &active {
            self.arm(*id);
        }
        info!(
            "reconciled {} reminders, {} armed",
            self.triggers.len(),
            active.len()
        );
    }

    /// # Errors
    /// [`crate::Error::InvalidSchedule`] or [`crate::Error::EmptyPayload`], nothing is stored then
    pub fn set_trigger(&mut self, options: TriggerOptions) -> Result<TriggerId> {
        let trigger = Trigger::from_options(TriggerId::new(), options, self.clock.now())?;
        let id = trigger.id;
        self.triggers.insert(trigger);
        self.persist();
        let due = self.arm(id);
        info!("added reminder {id}, next fire at {due:?}");
        Ok(id)
    }

    /// `Ok(false)` if there is no such trigger
    ///
    /// # Errors
    /// if the edited trigger would be invalid, the trigger is left as it was
    pub fn update_trigger(
        &mut self,
        id: TriggerId,
        edits: impl IntoIterator<Item = TriggerEdit>,
    ) -> Result<bool> {
        let Some(existing) = self.triggers.get(id) else {
            return Ok(false);
        };
        let updated = existing.edited(edits, self.clock.now())?;
        let active = updated.active;
        self.disarm(id);
        self.triggers.insert(updated);
        self.persist();
        if active {
            self.arm(id);
        }
        info!("updated reminder {id}");
        Ok(true)
    }

    pub fn delete_trigger(&mut self, id: TriggerId) -> bool {
        if self.triggers.get(id).is_none() {
            return false;
        }
        self.disarm(id);
        self.stop_alert(id);
        self.triggers.remove(id);
        self.persist();
        info!("deleted reminder {id}");
        true
    }

    /// sets `active`, or flips it when `active` is `None`
    pub fn toggle_trigger(&mut self, id: TriggerId, active: Option<bool>) -> bool {
        let Some(trigger) = self.triggers.get_mut(id) else {
            return false;
        };
        let active = active.unwrap_or(!trigger.active);
        if trigger.active != active {
            trigger.active = active;
            self.persist();
        }
        if active {
            if !self.armed.contains_key(&id) {
                self.arm(id);
            }
        } else {
            self.disarm(id);
        }
        info!("reminder {id} is now {}", if active { "on" } else { "off" });
        true
    }

    #[must_use]
    pub fn list_triggers(&self) -> Vec<TriggerSummary> {
        self.triggers
            .iter()
            .map(|trigger| TriggerSummary {
                id: trigger.id,
                kind: trigger.kind(),
                schedule: trigger.schedule,
                title: trigger.title(),
                body: trigger.body().unwrap_or_default(),
                reminder: trigger.reminder.clone(),
                alert: trigger.alert,
                active: trigger.active,
                created_at: trigger.created_at,
                last_fired_at: trigger.last_fired_at,
                next_fire: self.next_fire(trigger.id),
            })
            .collect()
    }

    /// silences `id` and sets up a one shot copy of it `minutes` from now, the original
    /// schedule is left alone
    pub fn snooze(&mut self, id: TriggerId, minutes: Option<u32>) -> bool {
        let Some(original) = self
            .triggers
            .get(id)
            .or_else(|| self.alerting.get(&id))
            .cloned()
        else {
            return false;
        };
        self.stop_alert(id);
        let minutes = minutes
            .or(original.alert.snooze_minutes)
            .unwrap_or(self.config.default_snooze_minutes);
        // snoozing a snooze points back at the same original
        let (of, label) = match original.reminder {
            ReminderKind::Snooze { of } => (of, original.body()),
            _ => (
                id,
                Some(format!(
                    "{} (snoozed)",
                    original.body().unwrap_or_else(|| original.title())
                )),
            ),
        };
        let mut options = TriggerOptions::after(Duration::minutes(i64::from(minutes)))
            .kind(ReminderKind::Snooze { of });
        options.label = label;
        options.alert = original.alert;
        match self.set_trigger(options) {
            Ok(snoozed) => {
                info!("snoozed {id} for {minutes} minutes as {snoozed}");
                true
            }
            Err(e) => {
                warn!("couldn't snooze {id}: {e}");
                false
            }
        }
    }

    /// silences whatever is going off right now
    pub fn stop_active_alert(&mut self) {
        self.sound.stop_all();
        self.alerting.clear();
    }

    /// what the notification interaction does: silence the alert and bring the app up
    pub fn acknowledge(&mut self, id: TriggerId) {
        self.stop_alert(id);
        self.notifications.focus_application();
    }

    /// fires `id` right away, this is what an expired timer runs
    pub fn fire_now(&mut self, id: TriggerId) -> bool {
        let now = self.clock.now();
        self.fire(id, now)
    }

    /// fires everything that is due and stops alarms that rang for too long,
    /// returns how many triggers fired
    pub fn tick(&mut self) -> usize {
        let now = self.clock.now();
        let mut fired = 0;
        while let Some(Expired {
            handle,
            trigger,
            due,
        }) = self.timers.pop_due(now)
        {
            if self.armed.get(&trigger) == Some(&handle) {
                self.armed.remove(&trigger);
            }
            if self.fire(trigger, due) {
                fired += 1;
            }
        }
        for id in self.sound.expire(now) {
            self.alerting.remove(&id);
        }
        fired
    }

    /// applies every queued message, returns false once a shutdown was requested
    pub fn process_messages(&mut self) -> bool {
        while let Ok(message) = self.receiver.try_recv() {
            if !self.handle_message(message) {
                return false;
            }
        }
        true
    }

    /// runs until a [`Message::Shutdown`] arrives
    pub fn run(&mut self) {
        info!("reminder engine running");
        loop {
            let wait = self.next_wakeup().map_or(MAX_WAIT, |due| {
                (due - self.clock.now())
                    .to_std()
                    .unwrap_or(StdDuration::ZERO)
                    .min(MAX_WAIT)
            });
            match self.receiver.recv_timeout(wait) {
                Ok(message) => {
                    if !self.handle_message(message) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            self.tick();
        }
        self.stop_active_alert();
        info!("reminder engine stopped");
    }

    /// registers whatever the source wants reminded about
    pub fn poll_source(&mut self, source: &mut dyn ReminderSource) -> Vec<TriggerId> {
        let now = self.clock.now();
        source
            .poll(now)
            .into_iter()
            .filter_map(|options| match self.set_trigger(options) {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("{} produced a reminder that was rejected: {e}", source.name());
                    None
                }
            })
            .collect()
    }

    #[must_use]
    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(self.sender.clone())
    }

    #[must_use]
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.timers.next_due()
    }

    #[must_use]
    pub fn next_fire(&self, id: TriggerId) -> Option<DateTime<Utc>> {
        self.armed
            .get(&id)
            .and_then(|handle| self.timers.due_at(*handle))
    }

    /// live timers pointing at `id`, never more than one
    #[must_use]
    pub fn armed_timers(&self, id: TriggerId) -> usize {
        self.timers.armed_for(id)
    }

    #[must_use]
    pub fn is_alerting(&self, id: TriggerId) -> bool {
        self.alerting.contains_key(&id)
    }

    #[must_use]
    pub fn trigger(&self, id: TriggerId) -> Option<&Trigger> {
        self.triggers.get(id)
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn handle_message(&mut self, message: Message) -> bool {
        debug!("handling {message:?}");
        match message {
            Message::SetTrigger(options) => {
                if let Err(e) = self.set_trigger(options) {
                    warn!("rejected reminder: {e}");
                }
            }
            Message::UpdateTrigger(id, edits) => match self.update_trigger(id, edits) {
                Ok(true) => {}
                Ok(false) => debug!("no reminder {id} to update"),
                Err(e) => warn!("rejected update to {id}: {e}"),
            },
            Message::DeleteTrigger(id) => {
                self.delete_trigger(id);
            }
            Message::ToggleTrigger(id, active) => {
                self.toggle_trigger(id, active);
            }
            Message::Snooze(id, minutes) => {
                self.snooze(id, minutes);
            }
            Message::StopActiveAlert => self.stop_active_alert(),
            Message::Acknowledged(id) => self.acknowledge(id),
            Message::Shutdown => return false,
        }
        true
    }

    /// `scheduled -> firing`, then on to rescheduled or consumed
    fn fire(&mut self, id: TriggerId, fired_at: DateTime<Utc>) -> bool {
        let Some(trigger) = self.triggers.get(id).cloned() else {
            debug!("timer fired for unknown reminder {id}");
            return false;
        };
        self.disarm(id);
        let now = self.clock.now();
        info!("firing reminder {id}");
        self.alert(&trigger, now);

        match after_fire(&trigger.schedule, now.max(fired_at), self.clock.zone()) {
            FireOutcome::Rescheduled(next) => {
                if let Some(stored) = self.triggers.get_mut(id) {
                    stored.last_fired_at = Some(now);
                }
                self.persist();
                self.arm_at(id, next);
                debug!("reminder {id} rescheduled for {next}");
            }
            FireOutcome::Consumed => {
                self.triggers.remove(id);
                self.persist();
                debug!("reminder {id} consumed");
            }
        }
        true
    }

    /// sound, notification and vibration, each one failing leaves the others alone
    fn alert(&mut self, trigger: &Trigger, now: DateTime<Utc>) {
        let id = trigger.id;
        self.alerting.insert(id, trigger.clone());
        if trigger.alert.sound && !self.sound.play(id, now) {
            debug!("reminder {id} fired without sound");
        }

        let handle = self.handle();
        let on_interact: Interaction = Box::new(move || {
            // the engine may be gone by the time someone clicks
            let _ = handle.send(Message::Acknowledged(id));
        });
        let body = trigger.body().unwrap_or_default();
        if self
            .notifications
            .notify(&trigger.title(), &body, Some(on_interact))
            .is_none()
        {
            debug!("reminder {id} fired without a notification");
        }

        if trigger.alert.vibration {
            if let Some(haptics) = &mut self.haptics {
                haptics.pulse(&self.config.vibration_pattern);
            }
        }
    }

    fn stop_alert(&mut self, id: TriggerId) {
        self.sound.stop(id);
        self.alerting.remove(&id);
    }

    /// arms the timer for the trigger's next occurrence from now
    fn arm(&mut self, id: TriggerId) -> Option<DateTime<Utc>> {
        let schedule = self.triggers.get(id)?.schedule;
        let due = match schedule {
            Schedule::Daily(time) => next_daily(self.clock.zone(), self.clock.now(), time),
            // already passed ones are due straight away
            Schedule::Once { at } => at,
        };
        self.arm_at(id, due);
        Some(due)
    }

    fn arm_at(&mut self, id: TriggerId, due: DateTime<Utc>) {
        self.disarm(id);
        let handle = self.timers.arm(due, id);
        self.armed.insert(id, handle);
    }

    fn disarm(&mut self, id: TriggerId) -> bool {
        self.armed
            .remove(&id)
            .is_some_and(|handle| self.timers.cancel(handle))
    }

    /// a failed write only costs surviving a restart, the in memory state stays authoritative
    fn persist(&mut self) {
        if let Err(e) = self.store.save_all(&self.triggers) {
            error!("couldn't save reminders: {e}");
        }
    }
}
