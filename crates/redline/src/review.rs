//! Review decision coordination
//!
//! Surfaces discovered foreign forks to the user, records accept/discard
//! choices, and issues merge requests to the external merge service. Merge
//! completion and failure are owned by that service; nothing here waits on
//! or retries a merge. Declines are remembered for the session only.

use crate::config::RepromptPolicy;
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};

/// Answer to the discovery prompt for a foreign fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewChoice {
    /// Connect to the fork and review it
    Open,
    /// Leave it alone
    Discard,
}

/// The user-facing decision prompt.
///
/// Rendering is a frontend concern; this seam only defines the semantics
/// of the binary choice.
#[async_trait]
pub trait DecisionSurface: Send + Sync {
    /// Ask whether to open a newly discovered foreign fork.
    async fn offer_review(&self, fork_id: &str) -> ReviewChoice;
}

/// External merge service.
///
/// Fire-and-forget: the call returns without a completion signal; outcome
/// reporting happens on the service's own channel.
pub trait MergeService: Send + Sync {
    fn request_merge(&self, current_room_id: &str, root_room_id: &str);
}

/// Tracks which foreign forks have been offered for review.
#[derive(Debug)]
pub struct ReviewDecisionCoordinator {
    policy: RepromptPolicy,
    prompted: HashSet<String>,
}

impl ReviewDecisionCoordinator {
    pub fn new(policy: RepromptPolicy) -> Self {
        Self {
            policy,
            prompted: HashSet::new(),
        }
    }

    /// Whether a discovery of `fork_id` should surface a prompt now.
    ///
    /// Under `OncePerSession` the first call per id returns true and marks
    /// it prompted; under `EveryAnnouncement` every call returns true.
    pub fn should_prompt(&mut self, fork_id: &str) -> bool {
        match self.policy {
            RepromptPolicy::EveryAnnouncement => true,
            RepromptPolicy::OncePerSession => self.prompted.insert(fork_id.to_string()),
        }
    }

    /// Hand a merge request to the external service.
    pub fn request_merge(
        &self,
        merger: &dyn MergeService,
        current_room_id: &str,
        root_room_id: &str,
    ) {
        info!(current_room_id, root_room_id, "requesting merge");
        merger.request_merge(current_room_id, root_room_id);
    }

    /// Record a discard request.
    ///
    /// No external discard operation is wired yet; the fork stays in shared
    /// state and remains selectable.
    pub fn request_discard(&self) {
        debug!("discard requested; no discard operation wired");
    }
}
