//! Room connection discipline
//!
//! A client is attached to exactly one logical room at a time: the root
//! document or one fork. `RoomConnectionManager` wraps the provider's
//! `connect_fork` and guarantees idempotence so callers can re-select the
//! current room without side effects.

use crate::provider::ForkOperations;
use redline_api::ApiError;
use tracing::debug;

/// The single logical room a client can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RoomTarget {
    #[default]
    Root,
    Fork(String),
}

impl RoomTarget {
    /// Resolve the provider room id for this target.
    pub fn room_id<'a>(&'a self, root_room_id: &'a str) -> &'a str {
        match self {
            RoomTarget::Root => root_room_id,
            RoomTarget::Fork(fork_id) => fork_id,
        }
    }
}

/// Tracks the attached room and issues provider connects.
#[derive(Debug)]
pub struct RoomConnectionManager {
    root_room_id: String,
    current: RoomTarget,
}

impl RoomConnectionManager {
    pub fn new(root_room_id: impl Into<String>) -> Self {
        Self {
            root_room_id: root_room_id.into(),
            current: RoomTarget::Root,
        }
    }

    pub fn current(&self) -> &RoomTarget {
        &self.current
    }

    /// Attach to `target`, skipping the provider call when already there.
    ///
    /// Connects are issued synchronously in response to discrete events; a
    /// connect in flight is not cancelled by a later one (last-call-wins at
    /// the provider layer).
    pub async fn connect(
        &mut self,
        handle: &dyn ForkOperations,
        target: RoomTarget,
    ) -> Result<(), ApiError> {
        if target == self.current {
            debug!(room_id = %target.room_id(&self.root_room_id), "already attached, skipping connect");
            return Ok(());
        }
        let room_id = target.room_id(&self.root_room_id).to_string();
        handle.connect_fork(&room_id).await?;
        debug!(%room_id, "switched room");
        self.current = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryHandle;

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let handle = MemoryHandle::new("root");
        let fork_id = handle.fork().await.unwrap();
        let mut rooms = RoomConnectionManager::new("root");

        rooms
            .connect(&handle, RoomTarget::Fork(fork_id.clone()))
            .await
            .unwrap();
        rooms
            .connect(&handle, RoomTarget::Fork(fork_id.clone()))
            .await
            .unwrap();

        // One provider call despite two requests
        assert_eq!(handle.connect_log(), vec![fork_id.clone()]);
        assert_eq!(rooms.current(), &RoomTarget::Fork(fork_id));
    }

    #[tokio::test]
    async fn test_connect_switches_between_root_and_fork() {
        let handle = MemoryHandle::new("root");
        let fork_id = handle.fork().await.unwrap();
        let mut rooms = RoomConnectionManager::new("root");

        rooms
            .connect(&handle, RoomTarget::Fork(fork_id.clone()))
            .await
            .unwrap();
        rooms.connect(&handle, RoomTarget::Root).await.unwrap();

        assert_eq!(handle.connect_log(), vec![fork_id, "root".to_string()]);
        assert_eq!(handle.current_room_id(), "root");
    }

    #[tokio::test]
    async fn test_failed_connect_keeps_current_target() {
        let handle = MemoryHandle::new("root");
        let mut rooms = RoomConnectionManager::new("root");

        let err = rooms
            .connect(&handle, RoomTarget::Fork("ghost".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::RoomNotFound { .. }));
        assert_eq!(rooms.current(), &RoomTarget::Root);
    }

    #[test]
    fn test_room_id_resolution() {
        assert_eq!(RoomTarget::Root.room_id("root"), "root");
        assert_eq!(RoomTarget::Fork("f".to_string()).room_id("root"), "f");
    }
}
