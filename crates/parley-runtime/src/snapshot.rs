//! Broadcast channel carrying [`AgentSnapshot`]s to display sinks.
//!
//! Every subscriber receives every snapshot; a slow subscriber loses the
//! oldest ones instead of stalling the agent.

use parley_types::AgentSnapshot;
use tokio::sync::broadcast;
use tracing::trace;

/// Snapshots buffered per subscriber before old ones are dropped.
const DEFAULT_CAPACITY: usize = 64;

/// Cheap to clone; all clones share one channel.
#[derive(Clone, Debug)]
pub struct SnapshotBus {
    sender: broadcast::Sender<AgentSnapshot>,
}

impl Default for SnapshotBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SnapshotBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Deliver `snapshot` to current subscribers. Returns how many received
    /// it; having none is not an error.
    pub fn publish(&self, snapshot: AgentSnapshot) -> usize {
        match self.sender.send(snapshot) {
            Ok(n) => n,
            Err(_) => {
                trace!("snapshot dropped: no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentSnapshot> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
