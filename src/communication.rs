use std::sync::mpsc::{SendError, Sender};

use crate::trigger::{TriggerEdit, TriggerId, TriggerOptions};

/// requests for the engine from other threads, applied on the engine's own thread
#[derive(Debug, Clone)]
pub enum Message {
    SetTrigger(TriggerOptions),
    UpdateTrigger(TriggerId, Vec<TriggerEdit>),
    DeleteTrigger(TriggerId),
    ToggleTrigger(TriggerId, Option<bool>),
    Snooze(TriggerId, Option<u32>),
    StopActiveAlert,
    /// the user interacted with the notification for this trigger
    Acknowledged(TriggerId),
    Shutdown,
}

/// a cloneable way to reach a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: Sender<Message>,
}

impl EngineHandle {
    #[must_use]
    pub const fn new(sender: Sender<Message>) -> Self {
        Self { sender }
    }

    /// # Errors
    /// if the engine is gone
    pub fn send(&self, message: Message) -> Result<(), SendError<Message>> {
        self.sender.send(message)
    }
}
