use serde::{Deserialize, Serialize};

use async_trait::async_trait;
use std::{pin::Pin, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::Stream;

use crate::{ApiError, Value};

/// A single changed shared-state field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateEntry {
    /// Field name. Names under the reserved `fork_` prefix are announcements.
    pub name: String,
    pub value: Value,
}

impl StateEntry {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// One change notification from the shared document.
///
/// A batch carries every field that changed in one underlying update, in the
/// order the handle observed them. Multiple entries per batch are normal;
/// consumers must process them in entry order and be idempotent under
/// replay after reconnect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StateChangeBatch {
    pub entries: Vec<StateEntry>,
}

impl StateChangeBatch {
    pub fn single(name: impl Into<String>, value: Value) -> Self {
        Self {
            entries: vec![StateEntry::new(name, value)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Real-time shared-state change notification.
///
/// Handles that replicate shared state implement this trait. The stream
/// yields change batches from subscription time onward; it ends when the
/// handle shuts down and unsubscribes automatically when dropped.
///
/// # Example
///
/// ```rust,no_run
/// use redline_api::ChangeNotifications;
/// use tokio_stream::StreamExt;
///
/// async fn example(handle: impl ChangeNotifications) {
///     let mut stream = handle.watch_state_changes().await;
///     while let Some(result) = stream.next().await {
///         match result {
///             Ok(batch) => {
///                 for entry in batch.entries {
///                     println!("state changed: {}", entry.name);
///                 }
///             }
///             Err(e) => eprintln!("change stream error: {e}"),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ChangeNotifications: Send + Sync {
    /// Subscribe to shared-state changes.
    ///
    /// Errors are propagated through the stream's `Result` items rather than
    /// terminating it; a closed stream means the handle went away.
    async fn watch_state_changes(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<StateChangeBatch, ApiError>> + Send>>;
}

/// Type alias for change notification subscribers
pub type StateSubscribers = Arc<Mutex<Vec<mpsc::Sender<Result<StateChangeBatch, ApiError>>>>>;
