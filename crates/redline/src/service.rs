//! Suggestion service
//!
//! Composition root for one collaborative editing session. Owns the state
//! machine, menu, room manager and review coordinator, subscribes the fork
//! announcement watcher once, and runs a single-flow event loop over user
//! commands, internal async completions and announcements.
//!
//! Fork creation and discovery dialogs run as spawned tasks that feed their
//! results back into the loop; they hold nothing but a channel sender, so a
//! dropped service discards late resolutions instead of mutating a
//! torn-down session. Review prompt answers additionally carry the review
//! epoch at prompt time and are dropped when the user has since returned to
//! Root.

use crate::config::SessionConfig;
use crate::menu::{MenuEntry, SuggestionMenu};
use crate::provider::DocumentHandle;
use crate::review::{DecisionSurface, MergeService, ReviewChoice, ReviewDecisionCoordinator};
use crate::rooms::RoomConnectionManager;
use crate::session::{ClientMode, ClientSession, Effect, OwnFork, SessionEvent};
use crate::watcher::{ForkAnnouncement, ForkAnnouncementWatcher};
use redline_api::{ApiError, Value, fork_state_key};
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

/// Commands the frontend can issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// "Suggesting" in the mode menu
    SelectSuggesting,
    /// "Editing" in the mode menu
    SelectEditing,
    /// "Root" in the suggestion menu
    SelectRoot,
    /// A fork in the suggestion menu
    SelectFork { fork_id: String },
    /// "Merge" while reviewing
    Merge,
    /// "Discard" while reviewing
    Discard,
}

/// Published view of the session for frontends and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub mode: ClientMode,
    pub my_fork: OwnFork,
    pub current_room_id: String,
    pub menu: Vec<MenuEntry>,
}

/// Client half of a running suggestion session.
#[derive(Debug, Clone)]
pub struct SuggestionHandle {
    commands: mpsc::Sender<UserCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SuggestionHandle {
    /// Send a user command to the session loop.
    pub async fn send(&self, command: UserCommand) -> Result<(), ApiError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ApiError::InvalidOperation {
                message: "session has ended".to_string(),
            })
    }

    /// Current session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch channel for session state changes.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }
}

/// Results of spawned continuations, re-entering the loop as events.
#[derive(Debug)]
enum InternalEvent {
    ForkCreated { fork_id: String },
    ForkFailed,
    ReviewAnswer {
        fork_id: String,
        choice: ReviewChoice,
        epoch: u64,
    },
}

enum LoopEvent {
    Command(UserCommand),
    Internal(InternalEvent),
    Announcement(ForkAnnouncement),
}

/// One client's suggestion session.
pub struct SuggestionService {
    handle: Arc<dyn DocumentHandle>,
    surface: Arc<dyn DecisionSurface>,
    merger: Arc<dyn MergeService>,
    session: ClientSession,
    menu: SuggestionMenu,
    rooms: RoomConnectionManager,
    coordinator: ReviewDecisionCoordinator,
    announcements: Pin<Box<dyn Stream<Item = ForkAnnouncement> + Send>>,
    announcements_done: bool,
    commands_rx: mpsc::Receiver<UserCommand>,
    internal_tx: mpsc::Sender<InternalEvent>,
    internal_rx: mpsc::Receiver<InternalEvent>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    /// Bumped when review context is cleared; stale prompt answers compare
    /// unequal and are dropped
    review_epoch: u64,
}

impl SuggestionService {
    pub async fn new(
        handle: Arc<dyn DocumentHandle>,
        surface: Arc<dyn DecisionSurface>,
        merger: Arc<dyn MergeService>,
        config: SessionConfig,
    ) -> (Self, SuggestionHandle) {
        let root_room_id = handle.root_room_id();
        let session = ClientSession::new(root_room_id.clone());

        let watcher = ForkAnnouncementWatcher::new(root_room_id.clone());
        let announcements = watcher.watch(handle.as_ref()).await;

        let (commands_tx, commands_rx) = mpsc::channel(config.channel_capacity);
        let (internal_tx, internal_rx) = mpsc::channel(config.channel_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot {
            mode: ClientMode::Editing,
            my_fork: OwnFork::None,
            current_room_id: root_room_id.clone(),
            menu: Vec::new(),
        });

        info!(%root_room_id, "suggestion session opened");
        let service = Self {
            handle,
            surface,
            merger,
            session,
            menu: SuggestionMenu::new(),
            rooms: RoomConnectionManager::new(root_room_id),
            coordinator: ReviewDecisionCoordinator::new(config.reprompt),
            announcements,
            announcements_done: false,
            commands_rx,
            internal_tx,
            internal_rx,
            snapshot_tx,
            review_epoch: 0,
        };
        let client = SuggestionHandle {
            commands: commands_tx,
            snapshot: snapshot_rx,
        };
        (service, client)
    }

    /// Drive the session until every `SuggestionHandle` is dropped.
    pub async fn run(mut self) {
        loop {
            let event = tokio::select! {
                maybe = self.commands_rx.recv() => match maybe {
                    Some(command) => LoopEvent::Command(command),
                    None => break,
                },
                Some(internal) = self.internal_rx.recv() => LoopEvent::Internal(internal),
                maybe = self.announcements.next(), if !self.announcements_done => {
                    match maybe {
                        Some(announcement) => LoopEvent::Announcement(announcement),
                        None => {
                            debug!("announcement stream ended");
                            self.announcements_done = true;
                            continue;
                        }
                    }
                }
            };
            self.dispatch(event).await;
            self.publish_snapshot();
        }
        debug!("suggestion session closed");
    }

    async fn dispatch(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Command(command) => {
                let session_event = match command {
                    UserCommand::SelectSuggesting => SessionEvent::SuggestingSelected,
                    UserCommand::SelectEditing => SessionEvent::EditingSelected,
                    UserCommand::SelectRoot => SessionEvent::RootSelected,
                    UserCommand::SelectFork { fork_id } => SessionEvent::ForkSelected { fork_id },
                    UserCommand::Merge => SessionEvent::MergeRequested,
                    UserCommand::Discard => SessionEvent::DiscardRequested,
                };
                self.apply(session_event).await;
            }
            LoopEvent::Internal(internal) => match internal {
                InternalEvent::ForkCreated { fork_id } => {
                    self.apply(SessionEvent::ForkCreated { fork_id }).await;
                }
                InternalEvent::ForkFailed => {
                    self.apply(SessionEvent::ForkCreationFailed).await;
                }
                InternalEvent::ReviewAnswer {
                    fork_id,
                    choice,
                    epoch,
                } => {
                    if epoch != self.review_epoch {
                        debug!(%fork_id, "dropping stale review answer");
                        return;
                    }
                    let session_event = match choice {
                        ReviewChoice::Open => SessionEvent::ReviewAccepted { fork_id },
                        ReviewChoice::Discard => SessionEvent::ReviewDeclined { fork_id },
                    };
                    self.apply(session_event).await;
                }
            },
            LoopEvent::Announcement(announcement) => {
                self.apply(SessionEvent::AnnouncementReceived {
                    fork_id: announcement.fork_id,
                })
                .await;
            }
        }
    }

    async fn apply(&mut self, event: SessionEvent) {
        for effect in self.session.apply(event) {
            self.execute(effect).await;
        }
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::RequestFork => {
                let handle = self.handle.clone();
                let internal_tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result = match handle.fork().await {
                        Ok(fork_id) => InternalEvent::ForkCreated { fork_id },
                        Err(e) => {
                            warn!(error = %e, "fork creation failed");
                            InternalEvent::ForkFailed
                        }
                    };
                    let _ = internal_tx.send(result).await;
                });
            }
            Effect::Connect(target) => {
                if let Err(e) = self.rooms.connect(self.handle.as_ref(), target).await {
                    warn!(error = %e, "room switch failed");
                }
            }
            Effect::AnnounceFork { fork_id } => {
                let key = fork_state_key(&fork_id);
                let payload = serde_json::json!({
                    "created_at": chrono::Utc::now().to_rfc3339(),
                });
                let value = Value::Json(payload.to_string());
                if let Err(e) = self.handle.set_state(&key, value).await {
                    warn!(error = %e, %fork_id, "fork announcement write failed");
                }
            }
            Effect::RegisterMenuEntry { fork_id, own } => {
                self.menu.upsert(&fork_id, own);
            }
            Effect::ForeignForkDiscovered { fork_id } => {
                if !self.coordinator.should_prompt(&fork_id) {
                    return;
                }
                let surface = self.surface.clone();
                let internal_tx = self.internal_tx.clone();
                let epoch = self.review_epoch;
                tokio::spawn(async move {
                    let choice = surface.offer_review(&fork_id).await;
                    let _ = internal_tx
                        .send(InternalEvent::ReviewAnswer {
                            fork_id,
                            choice,
                            epoch,
                        })
                        .await;
                });
            }
            Effect::RequestMerge { fork_room_id } => {
                self.coordinator.request_merge(
                    self.merger.as_ref(),
                    &fork_room_id,
                    self.session.root_room_id(),
                );
            }
            Effect::RequestDiscard => {
                self.coordinator.request_discard();
            }
            Effect::ClearReviewContext => {
                self.review_epoch += 1;
            }
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx.send_replace(SessionSnapshot {
            mode: self.session.mode().clone(),
            my_fork: self.session.my_fork().clone(),
            current_room_id: self.session.current_room_id(),
            menu: self.menu.entries(),
        });
    }
}
