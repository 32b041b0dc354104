//! Sibling message channels

use tokio::sync::broadcast;

use super::ElectionMessage;

/// Cross-tab message channel
///
/// Delivery is best effort. A channel may echo a tab's own messages back to it;
/// receivers filter by tab id.
pub trait SiblingChannel: Send + Sync + 'static {
    fn post(&self, message: ElectionMessage);

    fn subscribe(&self) -> broadcast::Receiver<ElectionMessage>;
}

/// In-process channel shared by tabs living in one runtime
#[derive(Debug, Clone)]
pub struct LocalChannel {
    tx: broadcast::Sender<ElectionMessage>,
}

impl LocalChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SiblingChannel for LocalChannel {
    fn post(&self, message: ElectionMessage) {
        let _ = self.tx.send(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<ElectionMessage> {
        self.tx.subscribe()
    }
}
