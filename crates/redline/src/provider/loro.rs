//! Loro-based document handle
//!
//! The root document is a `LoroDoc`; the shared state map lives in a
//! `LoroMap` container named `state`, with values stored as JSON strings.
//! `fork()` materializes a writable branch by exporting a snapshot of the
//! root document and importing it into a fresh `LoroDoc` registered under a
//! provider-assigned room id.
//!
//! Replication and transport stay outside this handle: an outer sync layer
//! moves snapshot/update bytes between peers and feeds remote updates back
//! in through `set_state` on its side of the wire.

use async_trait::async_trait;
use loro::LoroDoc;
use redline_api::{ApiError, ChangeNotifications, StateChangeBatch, StateSubscribers, Value};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tracing::{debug, info};
use uuid::Uuid;

/// Container name of the shared state map inside the root document.
const STATE_MAP: &str = "state";

fn internal(e: impl std::fmt::Display) -> ApiError {
    ApiError::InternalError {
        message: e.to_string(),
    }
}

/// Read a state entry from the Loro state map.
/// Values are stored as JSON strings; anything else is treated as absent.
fn read_entry(state_map: &loro::LoroMap, name: &str) -> Option<Value> {
    match state_map.get(name) {
        Some(loro::ValueOrContainer::Value(val)) => val
            .as_string()
            .and_then(|s| serde_json::from_str(s.as_ref()).ok()),
        _ => None,
    }
}

/// Write a state entry into the Loro state map as a JSON string.
fn write_entry(state_map: &loro::LoroMap, name: &str, value: &Value) -> anyhow::Result<()> {
    let json = serde_json::to_string(value)?;
    state_map.insert(name, loro::LoroValue::from(json.as_str()))?;
    Ok(())
}

/// Loro-backed document handle.
pub struct LoroHandle {
    root_room_id: String,
    /// Root document holding the shared state map
    doc: Arc<tokio::sync::RwLock<LoroDoc>>,
    /// Fork rooms by id, each a branch imported from a root snapshot
    rooms: Arc<Mutex<HashMap<String, LoroDoc>>>,
    /// Room currently attached to
    current_room: Arc<Mutex<String>>,
    /// Active change notification subscribers
    subscribers: StateSubscribers,
}

impl LoroHandle {
    pub fn new(root_room_id: impl Into<String>) -> Self {
        let root_room_id = root_room_id.into();
        info!(%root_room_id, "created loro document handle");
        Self {
            root_room_id: root_room_id.clone(),
            doc: Arc::new(tokio::sync::RwLock::new(LoroDoc::new())),
            rooms: Arc::new(Mutex::new(HashMap::new())),
            current_room: Arc::new(Mutex::new(root_room_id)),
            subscribers: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    /// Export a snapshot of the root document for an external sync layer.
    pub async fn export_snapshot(&self) -> Result<Vec<u8>, ApiError> {
        let doc = self.doc.read().await;
        doc.export(loro::ExportMode::Snapshot).map_err(internal)
    }

    /// Export a snapshot of a fork room.
    ///
    /// The sync layer serves these bytes to peers that open the fork.
    pub fn fork_room_snapshot(&self, fork_id: &str) -> Result<Vec<u8>, ApiError> {
        let rooms = self.rooms.lock().unwrap();
        let doc = rooms.get(fork_id).ok_or_else(|| ApiError::RoomNotFound {
            room_id: fork_id.to_string(),
        })?;
        doc.export(loro::ExportMode::Snapshot).map_err(internal)
    }

    async fn notify_subscribers(&self, batch: StateChangeBatch) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|sender| sender.try_send(Ok(batch.clone())).is_ok());
    }
}

#[async_trait]
impl super::ForkOperations for LoroHandle {
    async fn fork(&self) -> Result<String, ApiError> {
        let snapshot = {
            let doc = self.doc.read().await;
            doc.export(loro::ExportMode::Snapshot).map_err(internal)?
        };

        let fork_doc = LoroDoc::new();
        fork_doc.import(&snapshot).map_err(internal)?;

        let fork_id = Uuid::new_v4().to_string();
        self.rooms
            .lock()
            .unwrap()
            .insert(fork_id.clone(), fork_doc);

        info!(%fork_id, "forked root document");
        Ok(fork_id)
    }

    async fn connect_fork(&self, room_id: &str) -> Result<(), ApiError> {
        if room_id != self.root_room_id && !self.rooms.lock().unwrap().contains_key(room_id) {
            return Err(ApiError::RoomNotFound {
                room_id: room_id.to_string(),
            });
        }
        let mut current = self.current_room.lock().unwrap();
        *current = room_id.to_string();
        debug!(room_id, "attached to room");
        Ok(())
    }

    fn root_room_id(&self) -> String {
        self.root_room_id.clone()
    }

    fn current_room_id(&self) -> String {
        self.current_room.lock().unwrap().clone()
    }
}

#[async_trait]
impl super::SharedState for LoroHandle {
    async fn set_state(&self, name: &str, value: Value) -> Result<(), ApiError> {
        {
            let doc = self.doc.write().await;
            let state_map = doc.get_map(STATE_MAP);
            write_entry(&state_map, name, &value).map_err(internal)?;
            doc.commit();
        }
        self.notify_subscribers(StateChangeBatch::single(name, value))
            .await;
        Ok(())
    }

    async fn get_state(&self, name: &str) -> Result<Option<Value>, ApiError> {
        let doc = self.doc.read().await;
        let state_map = doc.get_map(STATE_MAP);
        Ok(read_entry(&state_map, name))
    }
}

#[async_trait]
impl ChangeNotifications for LoroHandle {
    async fn watch_state_changes(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<StateChangeBatch, ApiError>> + Send>> {
        let (tx, rx) = mpsc::channel(100);
        self.subscribers.lock().await.push(tx);
        Box::pin(ReceiverStream::new(rx))
    }
}
