use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, Semester};

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for schedule changes, one channel per semester.
pub struct NotifyHub {
    channels: DashMap<Semester, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a semester's schedule changes. Creates the channel if needed.
    pub fn subscribe(&self, semester: Semester) -> broadcast::Receiver<Event> {
        let sender = self
            .channels
            .entry(semester)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, semester: Semester, event: &Event) {
        if let Some(sender) = self.channels.get(&semester) {
            let _ = sender.send(event.clone());
        }
    }
}
