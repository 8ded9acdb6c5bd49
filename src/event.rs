use tokio::sync::mpsc;

use crate::catalog::RecordId;

/// Notifications a directory tree sends to its host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeEvent {
    /// A node was selected. `None` is the "all media" entry; otherwise the id scopes the host's
    /// record listing.
    Selected { id: Option<String> },
    /// Records left the listed directory.
    RecordsMoved { ids: Vec<RecordId>, parent: String },
    /// A sync finished; the host should re-query its listing for `id`.
    Requery { id: Option<String> },
}

/// Ordered list of subscribers; every subscriber receives every event.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<mpsc::UnboundedSender<TreeEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber after the existing ones.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<TreeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber in registration order.
    pub fn emit(&self, event: TreeEvent) {
        for tx in &self.subscribers {
            // A dropped receiver only means that subscriber went away.
            let _ = tx.send(event.clone());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.iter().filter(|tx| !tx.is_closed()).count()
    }
}
