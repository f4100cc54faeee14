use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{audio::AlarmPattern, error::Result};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AlarmConfig {
    /// an alarm nobody reacts to stops by itself after this long
    pub ceiling_secs: u64,
    /// one full repetition of the alarm pattern
    pub period_millis: u64,
    /// 0.0 to 1.0
    pub volume: f32,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            ceiling_secs: 60,
            period_millis: 4000,
            volume: 1.0,
        }
    }
}

impl AlarmConfig {
    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        Duration::from_secs(self.ceiling_secs)
    }

    #[must_use]
    pub fn pattern(&self) -> AlarmPattern {
        AlarmPattern::default().with_period(Duration::from_millis(self.period_millis))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub time_format: String,
    pub default_snooze_minutes: u32,
    /// key the reminders are stored under
    pub storage_key: String,
    /// vibrate/pause lengths in milliseconds
    pub vibration_pattern: Vec<u64>,
    pub alarm: AlarmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_format: "%l:%M %p".to_string(),
            default_snooze_minutes: 5,
            storage_key: "roosty_reminder.triggers".to_string(),
            vibration_pattern: vec![200, 100, 200],
            alarm: AlarmConfig::default(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// if the file can't be read or isn't valid toml
    pub fn load(path: PathBuf) -> Result<Self> {
        let config = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&config)?)
    }

    /// the config at [`Config::config_path`], or the defaults if there is none yet
    ///
    /// # Errors
    /// if the file exists but can't be read or parsed
    pub fn load_or_default() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// # Errors
    /// if the directory or file can't be written
    pub fn save(&self, path: PathBuf) -> std::io::Result<()> {
        let config = toml::to_string(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, config)
    }

    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        let mut path = directories::ProjectDirs::from("", "", "roosty_reminder")?
            .config_dir()
            .to_path_buf();
        path.push("config.toml");
        Some(path)
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_some_and(|path| path.exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = toml::from_str("default_snooze_minutes = 10\n[alarm]\nvolume = 0.5\n").unwrap();
        assert_eq!(config.default_snooze_minutes, 10);
        assert_eq!(config.alarm.volume, 0.5);
        assert_eq!(config.alarm.ceiling(), Duration::from_secs(60));
        assert_eq!(config.storage_key, "roosty_reminder.triggers");
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("config.toml");
        let mut config = Config::new();
        config.vibration_pattern = vec![500];
        config.save(path.clone()).unwrap();
        assert_eq!(Config::load(path).unwrap(), config);
    }
}
