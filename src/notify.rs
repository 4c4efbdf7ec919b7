use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Channel for patients who are waiting and hold no bed yet.
pub const WAIT_QUEUE_CHANNEL: &str = "queue";

/// Broadcast hub for engine decisions, one channel per ward number.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Event>>,
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

    /// Subscribe to a ward (or `WAIT_QUEUE_CHANNEL`). Creates the channel if needed.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Event> {
        if let Some(sender) = self.channels.get(channel) {
            return sender.subscribe();
        }
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, channel: &str, event: &Event) {
        if let Some(sender) = self.channels.get(channel) {
            let _ = sender.send(event.clone());
        }
    }

    /// Drop a channel; current subscribers see it close.
    pub fn remove(&self, channel: &str) {
        self.channels.remove(channel);
    }
}
