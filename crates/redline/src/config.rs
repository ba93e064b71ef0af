//! Engine configuration

use serde::{Deserialize, Serialize};

/// When to surface the Open/Discard discovery prompt for a foreign fork.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepromptPolicy {
    /// Prompt the first time a fork id is discovered, then never again for
    /// the rest of the session.
    #[default]
    OncePerSession,
    /// Prompt on every announcement of the fork, including replays. This
    /// reproduces the observed behavior of re-evaluating the prompt guard
    /// on every change batch.
    EveryAnnouncement,
}

/// Tunables for a suggestion session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub reprompt: RepromptPolicy,
    /// Capacity of the command and internal event channels.
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reprompt: RepromptPolicy::OncePerSession,
            channel_capacity: 64,
        }
    }
}
