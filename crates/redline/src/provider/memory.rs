//! In-memory document handle
//!
//! A lightweight, non-persistent handle useful for:
//! - Unit testing the protocol engine without CRDT overhead
//! - Mocking in frontend development
//! - Reference implementation for documentation
//! - Property-based testing baseline
//!
//! Fork ids are generated from a counter so the same sequence of operations
//! always yields the same ids, which matters for property-based tests that
//! clone states.

use async_trait::async_trait;
use redline_api::{ApiError, ChangeNotifications, StateChangeBatch, StateSubscribers, Value};
use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tracing::debug;

/// HashMap-backed document handle.
///
/// # Example
///
/// ```rust,no_run
/// use redline::provider::{ForkOperations, MemoryHandle};
///
/// async fn example() -> anyhow::Result<()> {
///     let handle = MemoryHandle::new("root");
///
///     let fork_id = handle.fork().await?;
///     handle.connect_fork(&fork_id).await?;
///
///     assert_eq!(handle.current_room_id(), fork_id);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MemoryHandle {
    root_room_id: String,
    state: Arc<RwLock<MemoryState>>,
    subscribers: StateSubscribers,
}

#[derive(Debug)]
struct MemoryState {
    /// Shared state entries of the root document
    entries: HashMap<String, Value>,
    /// Fork rooms known to this handle
    rooms: HashSet<String>,
    /// Room currently attached to
    current_room: String,
    /// Counter for deterministic fork id generation
    next_fork_counter: u64,
    /// Every connect issued to the provider, in order (inspected by tests)
    connect_log: Vec<String>,
    /// Error to fail the next fork() call with, if set
    fork_error: Option<ApiError>,
}

impl MemoryHandle {
    pub fn new(root_room_id: impl Into<String>) -> Self {
        let root_room_id = root_room_id.into();
        let state = MemoryState {
            entries: HashMap::new(),
            rooms: HashSet::new(),
            current_room: root_room_id.clone(),
            next_fork_counter: 0,
            connect_log: Vec::new(),
            fork_error: None,
        };
        Self {
            root_room_id,
            state: Arc::new(RwLock::new(state)),
            subscribers: Arc::new(tokio::sync::Mutex::new(Vec::new())),
        }
    }

    /// Fail the next `fork()` call with the given error.
    pub fn inject_fork_error(&self, error: ApiError) {
        self.state.write().unwrap().fork_error = Some(error);
    }

    /// Connects issued so far, in call order.
    pub fn connect_log(&self) -> Vec<String> {
        self.state.read().unwrap().connect_log.clone()
    }

    /// Fork rooms created so far.
    pub fn known_forks(&self) -> Vec<String> {
        let state = self.state.read().unwrap();
        let mut forks: Vec<String> = state.rooms.iter().cloned().collect();
        forks.sort();
        forks
    }

    /// Register a fork room that another client created.
    ///
    /// Peers announce through shared state, but their fork rooms must also be
    /// connectable through this handle; tests use this to stand in for the
    /// replication layer's room directory.
    pub fn register_peer_fork(&self, fork_id: &str) {
        self.state.write().unwrap().rooms.insert(fork_id.to_string());
    }

    async fn notify_subscribers(&self, batch: StateChangeBatch) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|sender| sender.try_send(Ok(batch.clone())).is_ok());
    }
}

#[async_trait]
impl super::ForkOperations for MemoryHandle {
    async fn fork(&self) -> Result<String, ApiError> {
        let fork_id = {
            let mut state = self.state.write().unwrap();
            if let Some(error) = state.fork_error.take() {
                return Err(error);
            }
            let fork_id = format!("local://{}", state.next_fork_counter);
            state.next_fork_counter += 1;
            state.rooms.insert(fork_id.clone());
            fork_id
        };
        debug!(%fork_id, "created in-memory fork");
        Ok(fork_id)
    }

    async fn connect_fork(&self, room_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.write().unwrap();
        if room_id != self.root_room_id && !state.rooms.contains(room_id) {
            return Err(ApiError::RoomNotFound {
                room_id: room_id.to_string(),
            });
        }
        state.connect_log.push(room_id.to_string());
        state.current_room = room_id.to_string();
        Ok(())
    }

    fn root_room_id(&self) -> String {
        self.root_room_id.clone()
    }

    fn current_room_id(&self) -> String {
        self.state.read().unwrap().current_room.clone()
    }
}

#[async_trait]
impl super::SharedState for MemoryHandle {
    async fn set_state(&self, name: &str, value: Value) -> Result<(), ApiError> {
        {
            let mut state = self.state.write().unwrap();
            state.entries.insert(name.to_string(), value.clone());
        }
        self.notify_subscribers(StateChangeBatch::single(name, value))
            .await;
        Ok(())
    }

    async fn get_state(&self, name: &str) -> Result<Option<Value>, ApiError> {
        Ok(self.state.read().unwrap().entries.get(name).cloned())
    }
}

#[async_trait]
impl ChangeNotifications for MemoryHandle {
    async fn watch_state_changes(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<StateChangeBatch, ApiError>> + Send>> {
        let (tx, rx) = mpsc::channel(100);
        self.subscribers.lock().await.push(tx);
        Box::pin(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::super::{ForkOperations, SharedState};
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_fork_ids_are_deterministic() {
        let handle = MemoryHandle::new("root");
        assert_eq!(handle.fork().await.unwrap(), "local://0");
        assert_eq!(handle.fork().await.unwrap(), "local://1");
    }

    #[tokio::test]
    async fn test_connect_unknown_room_fails() {
        let handle = MemoryHandle::new("root");
        let err = handle.connect_fork("nope").await.unwrap_err();
        assert_eq!(
            err,
            ApiError::RoomNotFound {
                room_id: "nope".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_connect_root_and_fork() {
        let handle = MemoryHandle::new("root");
        let fork_id = handle.fork().await.unwrap();

        handle.connect_fork(&fork_id).await.unwrap();
        assert_eq!(handle.current_room_id(), fork_id);

        handle.connect_fork("root").await.unwrap();
        assert_eq!(handle.current_room_id(), "root");
        assert_eq!(handle.connect_log(), vec![fork_id, "root".to_string()]);
    }

    #[tokio::test]
    async fn test_set_state_notifies_watchers() {
        let handle = MemoryHandle::new("root");
        let mut stream = handle.watch_state_changes().await;

        handle
            .set_state("fork_local://0", Value::Null)
            .await
            .unwrap();

        let batch = stream.next().await.unwrap().unwrap();
        assert_eq!(batch.entries.len(), 1);
        assert_eq!(batch.entries[0].name, "fork_local://0");
    }

    #[tokio::test]
    async fn test_injected_fork_error_fails_once() {
        let handle = MemoryHandle::new("root");
        handle.inject_fork_error(ApiError::ForkFailed {
            message: "provider down".to_string(),
        });

        assert!(handle.fork().await.is_err());
        assert_eq!(handle.fork().await.unwrap(), "local://0");
    }

    #[tokio::test]
    async fn test_get_state_round_trip() {
        let handle = MemoryHandle::new("root");
        assert_eq!(handle.get_state("missing").await.unwrap(), None);

        handle
            .set_state("k", Value::String("v".to_string()))
            .await
            .unwrap();
        assert_eq!(
            handle.get_state("k").await.unwrap(),
            Some(Value::String("v".to_string()))
        );
    }
}
