//! Client mode state machine
//!
//! Owns the client's editing mode and the identity of its self-authored
//! fork. The transition function is pure: it mutates only the session and
//! returns the effects the service layer must execute (fork requests, room
//! connects, announcements, review discovery, merge requests). Ownership
//! comparison against the own fork id is the single authority separating
//! "my suggestion" from "someone else's"; the shared state carries no
//! author field.
//!
//! Announcements that arrive while fork creation is still pending cannot be
//! classified yet. They are deferred and replayed once the creation result
//! lands, reconciling the two eventually-consistent signals.

use crate::rooms::RoomTarget;
use tracing::debug;

/// The `myForkId` cell: which fork, if any, this client authored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OwnFork {
    /// No fork authored in this session
    #[default]
    None,
    /// A fork was requested; the id has not resolved yet
    Pending,
    /// The provider assigned this id to our fork
    Assigned(String),
}

impl OwnFork {
    pub fn fork_id(&self) -> Option<&str> {
        match self {
            OwnFork::Assigned(id) => Some(id),
            _ => None,
        }
    }
}

/// Current editing mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClientMode {
    /// Attached to the root document
    #[default]
    Editing,
    /// Fork requested, awaiting the provider-assigned id
    SuggestionPending,
    /// Attached to the client's own fork
    SuggestionActive { fork_id: String },
    /// Attached to a peer's fork to evaluate it
    Reviewing { fork_id: String },
}

/// Discrete inputs to the state machine.
///
/// User commands, async completions and watcher announcements all funnel
/// through here; the machine stays correct under any interleaving of the
/// two event sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// User picked "Suggesting" from the mode menu
    SuggestingSelected,
    /// User picked "Editing" from the mode menu: back to the root document,
    /// keeping the own fork for later re-entry
    EditingSelected,
    /// User picked "Root" from the suggestion menu: back to the root
    /// document, retiring the own fork
    RootSelected,
    /// User picked a fork from the suggestion menu
    ForkSelected { fork_id: String },
    /// The provider resolved a pending fork request
    ForkCreated { fork_id: String },
    /// The provider rejected a pending fork request
    ForkCreationFailed,
    /// The watcher saw a fork announcement in shared state
    AnnouncementReceived { fork_id: String },
    /// User answered "Open" to a discovery prompt
    ReviewAccepted { fork_id: String },
    /// User answered "Discard" to a discovery prompt
    ReviewDeclined { fork_id: String },
    /// User picked "Merge" while reviewing
    MergeRequested,
    /// User picked "Discard" while reviewing
    DiscardRequested,
}

/// Work the service layer must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Ask the provider for a new fork
    RequestFork,
    /// Attach to a room
    Connect(RoomTarget),
    /// Write the `fork_<id>` announcement entry to shared state
    AnnounceFork { fork_id: String },
    /// Upsert a suggestion menu entry
    RegisterMenuEntry { fork_id: String, own: bool },
    /// A peer's fork surfaced for the first classification; the review
    /// coordinator decides whether to prompt
    ForeignForkDiscovered { fork_id: String },
    /// Issue a merge request for the fork room currently under review
    RequestMerge { fork_room_id: String },
    /// Record a discard request (placeholder, no external call yet)
    RequestDiscard,
    /// Invalidate outstanding review prompts
    ClearReviewContext,
}

/// Per-client session state. One per running client instance, not
/// replicated; created when a collaborative document opens.
#[derive(Debug, Clone)]
pub struct ClientSession {
    root_room_id: String,
    my_fork: OwnFork,
    mode: ClientMode,
    current_room: RoomTarget,
    /// Announcements seen while our own fork id was still unresolved
    deferred_announcements: Vec<String>,
}

impl ClientSession {
    pub fn new(root_room_id: impl Into<String>) -> Self {
        Self {
            root_room_id: root_room_id.into(),
            my_fork: OwnFork::None,
            mode: ClientMode::Editing,
            current_room: RoomTarget::Root,
            deferred_announcements: Vec::new(),
        }
    }

    pub fn mode(&self) -> &ClientMode {
        &self.mode
    }

    pub fn my_fork(&self) -> &OwnFork {
        &self.my_fork
    }

    pub fn current_room(&self) -> &RoomTarget {
        &self.current_room
    }

    /// Room id currently attached to, resolved against the root room id.
    pub fn current_room_id(&self) -> String {
        self.current_room.room_id(&self.root_room_id).to_string()
    }

    pub fn root_room_id(&self) -> &str {
        &self.root_room_id
    }

    /// Whether `fork_id` names this client's own fork.
    pub fn owns(&self, fork_id: &str) -> bool {
        self.my_fork.fork_id() == Some(fork_id)
    }

    /// Apply one event and return the effects to execute.
    pub fn apply(&mut self, event: SessionEvent) -> Vec<Effect> {
        debug!(?event, mode = ?self.mode, my_fork = ?self.my_fork, "session event");
        match event {
            SessionEvent::SuggestingSelected => self.on_suggesting_selected(),
            SessionEvent::EditingSelected => self.on_editing_selected(),
            SessionEvent::RootSelected => self.on_root_selected(),
            SessionEvent::ForkSelected { fork_id } => self.open_fork(fork_id),
            SessionEvent::ForkCreated { fork_id } => self.on_fork_created(fork_id),
            SessionEvent::ForkCreationFailed => self.on_fork_creation_failed(),
            SessionEvent::AnnouncementReceived { fork_id } => self.on_announcement(fork_id),
            SessionEvent::ReviewAccepted { fork_id } => self.open_fork(fork_id),
            SessionEvent::ReviewDeclined { .. } => Vec::new(),
            SessionEvent::MergeRequested => self.on_merge_requested(),
            SessionEvent::DiscardRequested => self.on_discard_requested(),
        }
    }

    fn on_suggesting_selected(&mut self) -> Vec<Effect> {
        match &self.my_fork {
            OwnFork::None => {
                self.my_fork = OwnFork::Pending;
                self.mode = ClientMode::SuggestionPending;
                vec![Effect::RequestFork]
            }
            // A request is already in flight; never issue a second one.
            OwnFork::Pending => Vec::new(),
            OwnFork::Assigned(fork_id) => {
                let fork_id = fork_id.clone();
                self.mode = ClientMode::SuggestionActive {
                    fork_id: fork_id.clone(),
                };
                self.current_room = RoomTarget::Fork(fork_id.clone());
                vec![Effect::Connect(RoomTarget::Fork(fork_id))]
            }
        }
    }

    fn on_editing_selected(&mut self) -> Vec<Effect> {
        self.mode = ClientMode::Editing;
        self.current_room = RoomTarget::Root;
        vec![Effect::Connect(RoomTarget::Root)]
    }

    fn on_root_selected(&mut self) -> Vec<Effect> {
        self.my_fork = OwnFork::None;
        self.mode = ClientMode::Editing;
        self.current_room = RoomTarget::Root;
        vec![
            Effect::Connect(RoomTarget::Root),
            Effect::ClearReviewContext,
        ]
    }

    /// Attach to a fork, re-evaluating ownership at this moment: our own
    /// fork opens as an active suggestion (no review actions), a peer's
    /// fork opens under review.
    fn open_fork(&mut self, fork_id: String) -> Vec<Effect> {
        self.current_room = RoomTarget::Fork(fork_id.clone());
        self.mode = if self.owns(&fork_id) {
            ClientMode::SuggestionActive {
                fork_id: fork_id.clone(),
            }
        } else {
            ClientMode::Reviewing {
                fork_id: fork_id.clone(),
            }
        };
        vec![Effect::Connect(RoomTarget::Fork(fork_id))]
    }

    fn on_fork_created(&mut self, fork_id: String) -> Vec<Effect> {
        match &self.my_fork {
            OwnFork::Pending | OwnFork::None => {
                let adopt_only = self.mode != ClientMode::SuggestionPending;
                self.my_fork = OwnFork::Assigned(fork_id.clone());

                let mut effects = vec![
                    Effect::AnnounceFork {
                        fork_id: fork_id.clone(),
                    },
                    Effect::RegisterMenuEntry {
                        fork_id: fork_id.clone(),
                        own: true,
                    },
                ];
                if adopt_only {
                    // The user already moved on (e.g. back to Root) before the
                    // request resolved; keep the fork discoverable but leave
                    // mode and room alone.
                    debug!(%fork_id, "fork resolved after mode change, adopting without connect");
                } else {
                    self.mode = ClientMode::SuggestionActive {
                        fork_id: fork_id.clone(),
                    };
                    self.current_room = RoomTarget::Fork(fork_id.clone());
                    effects.push(Effect::Connect(RoomTarget::Fork(fork_id)));
                }

                effects.extend(self.replay_deferred());
                effects
            }
            OwnFork::Assigned(existing) => {
                debug!(%existing, %fork_id, "ignoring fork result, one already assigned");
                Vec::new()
            }
        }
    }

    fn on_fork_creation_failed(&mut self) -> Vec<Effect> {
        if self.my_fork != OwnFork::Pending {
            return Vec::new();
        }
        // Roll back so a retry can issue a fresh request.
        self.my_fork = OwnFork::None;
        if self.mode == ClientMode::SuggestionPending {
            self.mode = ClientMode::Editing;
        }
        self.replay_deferred()
    }

    fn on_announcement(&mut self, fork_id: String) -> Vec<Effect> {
        match &self.my_fork {
            OwnFork::Pending => {
                // Could be our just-created fork racing the creation result;
                // classification waits until the result lands.
                if !self.deferred_announcements.contains(&fork_id) {
                    self.deferred_announcements.push(fork_id);
                }
                Vec::new()
            }
            OwnFork::Assigned(own) if *own == fork_id => {
                // Our fork is now visible in shared state: selectable, but
                // never a review candidate.
                vec![Effect::RegisterMenuEntry { fork_id, own: true }]
            }
            _ => vec![
                Effect::RegisterMenuEntry {
                    fork_id: fork_id.clone(),
                    own: false,
                },
                Effect::ForeignForkDiscovered { fork_id },
            ],
        }
    }

    fn on_merge_requested(&mut self) -> Vec<Effect> {
        match &self.mode {
            // An author cannot merge their own unreviewed suggestion.
            ClientMode::Reviewing { fork_id } if !self.owns(fork_id) => {
                vec![Effect::RequestMerge {
                    fork_room_id: fork_id.clone(),
                }]
            }
            _ => Vec::new(),
        }
    }

    fn on_discard_requested(&mut self) -> Vec<Effect> {
        match &self.mode {
            ClientMode::Reviewing { .. } => vec![Effect::RequestDiscard],
            _ => Vec::new(),
        }
    }

    fn replay_deferred(&mut self) -> Vec<Effect> {
        let deferred = std::mem::take(&mut self.deferred_announcements);
        let mut effects = Vec::new();
        for fork_id in deferred {
            if self.owns(&fork_id) {
                continue;
            }
            effects.push(Effect::RegisterMenuEntry {
                fork_id: fork_id.clone(),
                own: false,
            });
            effects.push(Effect::ForeignForkDiscovered { fork_id });
        }
        effects
    }
}
