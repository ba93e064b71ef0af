//! Suggestion menu registry
//!
//! Maps runtime-discovered fork ids to selectable menu entries. The
//! relation is a lookup table rebuilt by upserts on each announcement, so
//! replayed announcements and late ownership information both land as
//! idempotent updates. The listing is stable: the Root target first, then
//! forks in id order.

use crate::rooms::RoomTarget;
use std::collections::BTreeMap;

/// One selectable suggestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub fork_id: String,
    /// Whether this client authored the fork. Own entries open as active
    /// suggestions; foreign entries open under review.
    pub own: bool,
}

/// The per-session suggestion menu.
#[derive(Debug, Default)]
pub struct SuggestionMenu {
    entries: BTreeMap<String, MenuEntry>,
}

impl SuggestionMenu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or update the entry for a fork.
    pub fn upsert(&mut self, fork_id: &str, own: bool) {
        self.entries.insert(
            fork_id.to_string(),
            MenuEntry {
                fork_id: fork_id.to_string(),
                own,
            },
        );
    }

    pub fn contains(&self, fork_id: &str) -> bool {
        self.entries.contains_key(fork_id)
    }

    pub fn get(&self, fork_id: &str) -> Option<&MenuEntry> {
        self.entries.get(fork_id)
    }

    /// Fork entries in id order.
    pub fn entries(&self) -> Vec<MenuEntry> {
        self.entries.values().cloned().collect()
    }

    /// Every selectable room target: Root first, then forks in id order.
    pub fn targets(&self) -> Vec<RoomTarget> {
        std::iter::once(RoomTarget::Root)
            .chain(
                self.entries
                    .keys()
                    .map(|id| RoomTarget::Fork(id.clone())),
            )
            .collect()
    }
}
