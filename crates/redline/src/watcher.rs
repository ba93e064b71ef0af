//! Fork announcement discovery
//!
//! Watches the shared document's change stream for state entries in the
//! reserved `fork_` namespace and turns them into discrete announcement
//! events. One subscription per editing session; announcements are emitted
//! in delivery order, batches flattened in entry order. No deduplication
//! happens here: replayed announcements after a reconnect are forwarded and
//! the consumer handles them idempotently.

use redline_api::{ChangeNotifications, StateChangeBatch, parse_fork_key};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tracing::{debug, warn};

/// A fork made visible through shared state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkAnnouncement {
    pub fork_id: String,
}

/// Filters shared-state change batches down to fork announcements.
pub struct ForkAnnouncementWatcher {
    root_room_id: String,
}

impl ForkAnnouncementWatcher {
    pub fn new(root_room_id: impl Into<String>) -> Self {
        Self {
            root_room_id: root_room_id.into(),
        }
    }

    /// Extract the announcements carried by one change batch, in entry order.
    ///
    /// Names outside the reserved namespace are skipped silently; names
    /// inside it with an empty id or an id that collides with the root room
    /// id are malformed and dropped.
    pub fn announcements_in(&self, batch: &StateChangeBatch) -> Vec<ForkAnnouncement> {
        batch
            .entries
            .iter()
            .filter_map(|entry| {
                let fork_id = parse_fork_key(&entry.name)?;
                if fork_id == self.root_room_id {
                    debug!(name = %entry.name, "dropping malformed fork announcement");
                    return None;
                }
                Some(ForkAnnouncement {
                    fork_id: fork_id.to_string(),
                })
            })
            .collect()
    }

    /// Subscribe to a handle's change stream and emit announcements.
    ///
    /// Stream errors are logged and skipped; the returned stream ends when
    /// the source stream ends or the consumer is dropped.
    pub async fn watch(
        &self,
        handle: &dyn ChangeNotifications,
    ) -> Pin<Box<dyn Stream<Item = ForkAnnouncement> + Send>> {
        let mut source = handle.watch_state_changes().await;
        let root_room_id = self.root_room_id.clone();
        let (tx, rx) = mpsc::channel(100);

        tokio::spawn(async move {
            let watcher = ForkAnnouncementWatcher { root_room_id };
            while let Some(item) = source.next().await {
                match item {
                    Ok(batch) => {
                        for announcement in watcher.announcements_in(&batch) {
                            if tx.send(announcement).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!(error = %e, "state change stream error"),
                }
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }
}
