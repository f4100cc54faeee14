use thiserror::Error;

/// errors that the reminder engine surfaces to its callers
#[derive(Debug, Error)]
pub enum Error {
    /// hour/minute out of range or a negative delay
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),
    /// there is nothing to show in the notification
    #[error("reminder has no label and none can be derived from its kind")]
    EmptyPayload,
    #[error("couldn't persist reminders: {0}")]
    Persistence(#[from] StoreError),
    #[error("couldn't read config file: {0}")]
    ConfigRead(#[from] std::io::Error),
    #[error("couldn't parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("couldn't serialize reminders: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("couldn't find a data directory for the store")]
    NoDataDir,
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no audio output available: {0}")]
    Unavailable(String),
    #[error("couldn't start playback: {0}")]
    Playback(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
