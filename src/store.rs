//! durable persistence of trigger definitions
//!
//! the whole list of triggers is written under one key on every change and read back once at
//! startup, there is no scheduling logic in here

use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::PathBuf,
};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    trigger::{Trigger, TriggerId},
};

/// the durable key value medium the triggers are written to
pub trait KeyValueStore {
    /// # Errors
    /// if the medium can't be read, a missing key is `Ok(None)`
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// # Errors
    /// if the medium can't be written
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// one file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// a store in the user's data directory
    ///
    /// # Errors
    /// if the platform has no data directory
    pub fn in_data_dir() -> Result<Self, StoreError> {
        directories::ProjectDirs::from("", "", "roosty_reminder")
            .map(|dirs| Self::new(dirs.data_dir().to_path_buf()))
            .ok_or(StoreError::NoDataDir)
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.toml"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path(key), value)?;
        Ok(())
    }
}

/// in memory store, nothing survives the process
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }
}

/// triggers keyed by id, iterated and persisted in id order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TriggerSet {
    pub data: BTreeMap<TriggerId, Trigger>,
}

impl TriggerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, trigger: Trigger) -> Option<Trigger> {
        self.data.insert(trigger.id, trigger)
    }

    pub fn remove(&mut self, id: TriggerId) -> Option<Trigger> {
        self.data.remove(&id)
    }

    #[must_use]
    pub fn get(&self, id: TriggerId) -> Option<&Trigger> {
        self.data.get(&id)
    }

    pub fn get_mut(&mut self, id: TriggerId) -> Option<&mut Trigger> {
        self.data.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Trigger> {
        self.data.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Vec<Trigger>> for TriggerSet {
    fn from(value: Vec<Trigger>) -> Self {
        let mut set = Self::new();
        value.into_iter().for_each(|trigger| {
            set.insert(trigger);
        });
        set
    }
}

impl From<TriggerSet> for Vec<Trigger> {
    fn from(val: TriggerSet) -> Self {
        Self::from_iter(val.data.into_values())
    }
}

const FORMAT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct Document {
    version: u32,
    #[serde(default)]
    triggers: Vec<toml::Value>,
}

#[derive(Serialize)]
struct DocumentRef<'a> {
    version: u32,
    triggers: Vec<&'a Trigger>,
}

/// snapshot reads and writes of every trigger under a single key
#[derive(Debug)]
pub struct TriggerStore<S> {
    backend: S,
    key: String,
}

impl<S: KeyValueStore> TriggerStore<S> {
    pub fn new(backend: S, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// reads every stored trigger.
    ///
    /// an unreadable document is discarded as a whole and a single unreadable or invalid
    /// trigger is skipped, either way this never fails
    pub fn load_all(&self) -> TriggerSet {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return TriggerSet::new(),
            Err(e) => {
                warn!("couldn't read stored reminders, starting empty: {e}");
                return TriggerSet::new();
            }
        };
        let document: Document = match toml::from_str(&raw) {
            Ok(document) => document,
            Err(e) => {
                warn!("stored reminders are corrupt, discarding them: {e}");
                return TriggerSet::new();
            }
        };
        if document.version != FORMAT_VERSION {
            warn!(
                "stored reminders have unknown format version {}, discarding them",
                document.version
            );
            return TriggerSet::new();
        }
        let triggers = document
            .triggers
            .into_iter()
            .filter_map(|value| {
                match value.try_into::<Trigger>().map(Trigger::validate) {
                    Ok(Ok(trigger)) => Some(trigger),
                    Ok(Err(e)) => {
                        warn!("skipping invalid stored reminder: {e}");
                        None
                    }
                    Err(e) => {
                        warn!("skipping unreadable stored reminder: {e}");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();
        debug!("loaded {} reminders", triggers.len());
        triggers.into()
    }

    /// # Errors
    /// if the triggers can't be serialized or the backend write fails
    pub fn save_all(&mut self, triggers: &TriggerSet) -> Result<(), StoreError> {
        let document = DocumentRef {
            version: FORMAT_VERSION,
            triggers: triggers.iter().collect(),
        };
        let raw = toml::to_string(&document)?;
        self.backend.set(&self.key, &raw)?;
        debug!("saved {} reminders", triggers.len());
        Ok(())
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::trigger::{ReminderKind, TriggerOptions};

    const KEY: &str = "test.triggers";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn sample() -> TriggerSet {
        let options = [
            TriggerOptions::daily(7, 30).label("wake up").sound(false),
            TriggerOptions::after(Duration::minutes(15)).label("tea"),
            TriggerOptions::daily(11, 0).kind(ReminderKind::Hydration),
            TriggerOptions::after(Duration::hours(23)).kind(ReminderKind::Appointment {
                reference: "A-17".to_string(),
                starts_at: now() + Duration::days(1),
            }),
        ];
        options
            .into_iter()
            .map(|options| Trigger::from_options(TriggerId::new(), options, now()).unwrap())
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn save_then_load_gives_the_same_triggers() {
        let mut store = TriggerStore::new(MemoryStore::new(), KEY);
        let triggers = sample();
        store.save_all(&triggers).unwrap();
        assert_eq!(store.load_all(), triggers);
    }

    #[test]
    fn saving_what_was_loaded_changes_nothing() {
        let mut store = TriggerStore::new(MemoryStore::new(), KEY);
        store.save_all(&sample()).unwrap();
        let first = store.backend().get(KEY).unwrap();
        let loaded = store.load_all();
        store.save_all(&loaded).unwrap();
        assert_eq!(store.backend().get(KEY).unwrap(), first);
        assert_eq!(store.load_all(), loaded);
    }

    #[test]
    fn missing_key_is_empty() {
        let store = TriggerStore::new(MemoryStore::new(), KEY);
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn corrupt_document_is_discarded() {
        let mut backend = MemoryStore::new();
        backend.set(KEY, "this is [not toml").unwrap();
        let store = TriggerStore::new(backend, KEY);
        assert!(store.load_all().is_empty());
    }

    #[test]
    fn bad_entries_are_skipped() {
        let mut store = TriggerStore::new(MemoryStore::new(), KEY);
        let triggers = sample();
        store.save_all(&triggers).unwrap();
        let raw = store.backend().get(KEY).unwrap().unwrap();
        let broken = format!(
            "{raw}\n[[triggers]]\nid = \"not a uuid\"\ncreated_at = \"2024-05-01T09:00:00Z\"\n"
        );
        store.backend_mut().set(KEY, &broken).unwrap();
        assert_eq!(store.load_all(), triggers);
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TriggerStore::new(FileStore::new(dir.path().join("nested")), KEY);
        assert!(store.load_all().is_empty());
        let triggers = sample();
        store.save_all(&triggers).unwrap();
        assert!(dir.path().join("nested").join("test.triggers.toml").exists());
        assert_eq!(store.load_all(), triggers);
    }
}
