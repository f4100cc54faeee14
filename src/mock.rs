//! Stand-ins for every platform capability, for tests and for running the engine headless.
//!
//! Each mock hands out a shared view of what it recorded, so a test can keep looking after
//! the mock itself was moved into the engine.

use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    rc::Rc,
};

use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

use crate::{
    audio::{AlarmPattern, AudioBackend, VoiceId},
    clock::Clock,
    error::{AudioError, StoreError},
    notify::{Haptics, Interaction, NotificationHandle, NotificationSurface, Permission},
    schedule::Zone,
    store::{KeyValueStore, MemoryStore},
};

/// a clock that only moves when told to, daily times are read in a fixed offset
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<RefCell<DateTime<Utc>>>,
    offset: FixedOffset,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(RefCell::new(now)),
            offset: Utc.fix(),
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.borrow_mut() = now;
    }

    pub fn advance(&self, by: Duration) {
        let now = *self.now.borrow() + by;
        self.set(now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.borrow()
    }

    fn zone(&self) -> Zone {
        Zone::Fixed(self.offset)
    }
}

#[derive(Debug, Default)]
pub struct AudioLog {
    pub opened: u32,
    pub resumed: u32,
    pub started: Vec<VoiceId>,
    pub stopped: Vec<VoiceId>,
    pub playing: HashSet<VoiceId>,
    /// the next `open` fails
    pub unavailable: bool,
}

/// records what the synthesizer asked of the audio output
#[derive(Debug, Clone, Default)]
pub struct RecordingAudio {
    log: Rc<RefCell<AudioLog>>,
    next_voice: u64,
}

impl RecordingAudio {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// an output that can never be opened
    #[must_use]
    pub fn unavailable() -> Self {
        let audio = Self::default();
        audio.log.borrow_mut().unavailable = true;
        audio
    }

    #[must_use]
    pub fn log(&self) -> Rc<RefCell<AudioLog>> {
        self.log.clone()
    }
}

impl AudioBackend for RecordingAudio {
    fn open(&mut self) -> Result<(), AudioError> {
        let mut log = self.log.borrow_mut();
        if log.unavailable {
            return Err(AudioError::Unavailable("no output in tests".to_string()));
        }
        log.opened += 1;
        Ok(())
    }

    fn resume(&mut self) {
        self.log.borrow_mut().resumed += 1;
    }

    fn start(&mut self, _: &AlarmPattern, _: u32, _: f32) -> Result<VoiceId, AudioError> {
        self.next_voice += 1;
        let voice = VoiceId(self.next_voice);
        let mut log = self.log.borrow_mut();
        log.started.push(voice);
        log.playing.insert(voice);
        Ok(voice)
    }

    fn stop(&mut self, voice: VoiceId) {
        let mut log = self.log.borrow_mut();
        log.stopped.push(voice);
        log.playing.remove(&voice);
    }
}

#[derive(Default)]
pub struct NotificationLog {
    pub permission_requests: u32,
    pub shown: Vec<(String, String)>,
    pub interactions: Vec<Interaction>,
    pub focused: u32,
}

/// records every notification and keeps their interaction callbacks around
#[derive(Clone)]
pub struct RecordingNotifier {
    permission: Permission,
    log: Rc<RefCell<NotificationLog>>,
}

impl RecordingNotifier {
    #[must_use]
    pub fn new(permission: Permission) -> Self {
        Self {
            permission,
            log: Rc::default(),
        }
    }

    #[must_use]
    pub fn log(&self) -> Rc<RefCell<NotificationLog>> {
        self.log.clone()
    }

    /// acts like the user clicked the most recent notification, false if there was none
    pub fn interact_last(&self) -> bool {
        let interaction = self.log.borrow_mut().interactions.pop();
        interaction.map(|interact| interact()).is_some()
    }
}

impl NotificationSurface for RecordingNotifier {
    fn request_permission(&mut self) -> Permission {
        self.log.borrow_mut().permission_requests += 1;
        self.permission
    }

    fn show(
        &mut self,
        title: &str,
        body: &str,
        on_interact: Option<Interaction>,
    ) -> Result<NotificationHandle, String> {
        let mut log = self.log.borrow_mut();
        log.shown.push((title.to_string(), body.to_string()));
        if let Some(on_interact) = on_interact {
            log.interactions.push(on_interact);
        }
        Ok(NotificationHandle(log.shown.len() as u64))
    }

    fn focus_application(&mut self) {
        self.log.borrow_mut().focused += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingHaptics {
    pulses: Rc<RefCell<Vec<Vec<u64>>>>,
}

impl RecordingHaptics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pulses(&self) -> Vec<Vec<u64>> {
        self.pulses.borrow().clone()
    }
}

impl Haptics for RecordingHaptics {
    fn pulse(&mut self, pattern: &[u64]) {
        self.pulses.borrow_mut().push(pattern.to_vec());
    }
}

/// a memory store whose writes can be made to fail, shares its contents between clones
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Rc<RefCell<MemoryStore>>,
    failing: Rc<Cell<bool>>,
}

impl SharedStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.set(failing);
    }
}

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.borrow().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        if self.failing.get() {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "store is failing on purpose",
            )));
        }
        self.inner.borrow_mut().set(key, value)
    }
}
