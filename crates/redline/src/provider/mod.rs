//! Document handle traits
//!
//! This module defines the interface the protocol engine consumes from the
//! shared-document provider. The replication engine itself (conflict
//! resolution, transport) lives behind these traits and is not part of the
//! engine.
//!
//! # Trait Architecture
//!
//! The API is split into focused traits that handles can implement
//! selectively:
//!
//! - `ForkOperations`: fork creation and room switching
//! - `SharedState`: the replicated key/value state map
//! - `ChangeNotifications`: state change streams (from `redline-api`)
//!
//! The `DocumentHandle` supertrait combines all three for convenience.
//! Handles implementing all three automatically satisfy `DocumentHandle`.

pub mod loro;
pub mod memory;

pub use self::loro::LoroHandle;
pub use self::memory::MemoryHandle;

use async_trait::async_trait;
use redline_api::{ApiError, ChangeNotifications, Value};

/// Fork creation and room switching.
///
/// A handle is attached to exactly one room at a time: the root room or one
/// fork room. Fork ids are assigned by the handle and are globally unique
/// and immutable; clients never choose them.
#[async_trait]
pub trait ForkOperations: Send + Sync {
    /// Create a new writable fork of the root document.
    ///
    /// Returns the provider-assigned fork id. The fork is not announced to
    /// peers by this call; announcing is a shared-state write owned by the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ForkFailed` when the provider cannot create the
    /// fork. The caller must treat this as recoverable.
    async fn fork(&self) -> Result<String, ApiError>;

    /// Attach the handle to a room.
    ///
    /// `room_id` is either a fork id or the root room id; passing the root
    /// room id reconnects to the root document.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::RoomNotFound` for an id that names neither the
    /// root nor a known fork.
    async fn connect_fork(&self, room_id: &str) -> Result<(), ApiError>;

    /// The canonical room all forks branch from.
    fn root_room_id(&self) -> String;

    /// The room currently attached to.
    fn current_room_id(&self) -> String;
}

/// The replicated key/value state map of the root document.
///
/// Entries are append/overwrite-only; there is no compare-and-swap. Writes
/// become visible to every connected client through the change stream.
#[async_trait]
pub trait SharedState: Send + Sync {
    /// Write (or overwrite) a state entry.
    async fn set_state(&self, name: &str, value: Value) -> Result<(), ApiError>;

    /// Read a state entry, `None` when absent.
    async fn get_state(&self, name: &str) -> Result<Option<Value>, ApiError>;
}

/// Full document handle: forking, shared state, and change notifications.
pub trait DocumentHandle: ForkOperations + SharedState + ChangeNotifications {}

impl<T: ForkOperations + SharedState + ChangeNotifications> DocumentHandle for T {}
