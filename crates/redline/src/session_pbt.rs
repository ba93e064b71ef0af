//! Stateful property-based tests for the client mode state machine
//!
//! A small reference model tracks the abstract protocol state (the
//! `myForkId` cell and the pool of announced forks); the system under test
//! is the real `ClientSession`. After every transition the two are compared
//! and the protocol properties are checked:
//!
//! - a fork request is only ever issued from an empty `myForkId`
//! - ownership classification is stable: the own fork never surfaces as a
//!   review candidate
//! - merge is never requested for the own fork
//! - active-suggestion and reviewing modes always match room and ownership

use crate::rooms::RoomTarget;
use crate::session::{ClientMode, ClientSession, Effect, OwnFork, SessionEvent};
use proptest::prelude::*;
use proptest_state_machine::{ReferenceStateMachine, StateMachineTest};
use std::collections::BTreeSet;

/// Fork ids peers may announce.
const PEER_FORKS: [&str; 3] = ["p1", "p2", "p3"];

/// Abstract protocol state: the own-fork cell and the announced-fork pool.
#[derive(Debug, Clone, Default)]
struct ReferenceModel {
    /// "" (none), "pending", or the assigned fork id
    my_fork: String,
    /// Fork requests issued so far
    fork_requests: usize,
    /// Announced forks selectable from the menu
    known_forks: BTreeSet<String>,
    /// Announcements seen while our fork id was unresolved
    deferred: BTreeSet<String>,
}

impl ReferenceModel {
    /// Id the provider will assign to the currently pending request.
    fn pending_fork_id(&self) -> String {
        format!("own{}", self.fork_requests)
    }
}

impl ReferenceStateMachine for ReferenceModel {
    type State = Self;
    type Transition = SessionEvent;

    fn init_state() -> BoxedStrategy<Self::State> {
        Just(ReferenceModel::default()).boxed()
    }

    fn transitions(state: &Self::State) -> BoxedStrategy<Self::Transition> {
        let mut options: Vec<BoxedStrategy<SessionEvent>> = vec![
            Just(SessionEvent::SuggestingSelected).boxed(),
            Just(SessionEvent::EditingSelected).boxed(),
            Just(SessionEvent::RootSelected).boxed(),
            Just(SessionEvent::MergeRequested).boxed(),
            Just(SessionEvent::DiscardRequested).boxed(),
            proptest::sample::select(PEER_FORKS.as_slice())
                .prop_map(|id| SessionEvent::AnnouncementReceived {
                    fork_id: id.to_string(),
                })
                .boxed(),
        ];

        if state.my_fork == "pending" {
            let own_id = state.pending_fork_id();
            options.push(
                Just(SessionEvent::ForkCreated {
                    fork_id: own_id.clone(),
                })
                .boxed(),
            );
            options.push(Just(SessionEvent::ForkCreationFailed).boxed());
            // Our own announcement can land before the creation result does.
            options.push(
                Just(SessionEvent::AnnouncementReceived { fork_id: own_id }).boxed(),
            );
        }

        let known: Vec<String> = state.known_forks.iter().cloned().collect();
        if !known.is_empty() {
            options.push(
                proptest::sample::select(known.clone())
                    .prop_map(|fork_id| SessionEvent::ForkSelected { fork_id })
                    .boxed(),
            );
            options.push(
                proptest::sample::select(known.clone())
                    .prop_map(|fork_id| SessionEvent::ReviewAccepted { fork_id })
                    .boxed(),
            );
            options.push(
                proptest::sample::select(known)
                    .prop_map(|fork_id| SessionEvent::ReviewDeclined { fork_id })
                    .boxed(),
            );
        }

        proptest::strategy::Union::new(options).boxed()
    }

    fn preconditions(state: &Self::State, transition: &Self::Transition) -> bool {
        match transition {
            SessionEvent::ForkCreated { fork_id } => {
                state.my_fork == "pending" && *fork_id == state.pending_fork_id()
            }
            SessionEvent::ForkCreationFailed => state.my_fork == "pending",
            SessionEvent::ForkSelected { fork_id }
            | SessionEvent::ReviewAccepted { fork_id }
            | SessionEvent::ReviewDeclined { fork_id } => state.known_forks.contains(fork_id),
            _ => true,
        }
    }

    fn apply(mut state: Self::State, transition: &Self::Transition) -> Self::State {
        match transition {
            SessionEvent::SuggestingSelected => {
                if state.my_fork.is_empty() {
                    state.my_fork = "pending".to_string();
                    state.fork_requests += 1;
                }
            }
            SessionEvent::RootSelected => {
                state.my_fork = String::new();
            }
            SessionEvent::ForkCreated { fork_id } => {
                state.my_fork = fork_id.clone();
                state.known_forks.insert(fork_id.clone());
                let deferred = std::mem::take(&mut state.deferred);
                state.known_forks.extend(deferred);
            }
            SessionEvent::ForkCreationFailed => {
                state.my_fork = String::new();
                let deferred = std::mem::take(&mut state.deferred);
                state.known_forks.extend(deferred);
            }
            SessionEvent::AnnouncementReceived { fork_id } => {
                if state.my_fork == "pending" {
                    state.deferred.insert(fork_id.clone());
                } else {
                    state.known_forks.insert(fork_id.clone());
                }
            }
            _ => {}
        }
        state
    }
}

/// The real session plus effect counters inspected by the invariants.
#[derive(Debug)]
struct SessionUnderTest {
    session: ClientSession,
    fork_requests: usize,
    /// Set when a `ForeignForkDiscovered` effect named the own fork
    own_fork_discovered: bool,
    /// Set when a `RequestMerge` effect named the own fork
    own_fork_merge: bool,
}

impl StateMachineTest for SessionUnderTest {
    type SystemUnderTest = Self;
    type Reference = ReferenceModel;

    fn init_test(
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) -> Self::SystemUnderTest {
        SessionUnderTest {
            session: ClientSession::new("root"),
            fork_requests: 0,
            own_fork_discovered: false,
            own_fork_merge: false,
        }
    }

    fn apply(
        mut state: Self::SystemUnderTest,
        _ref_state: &<Self::Reference as ReferenceStateMachine>::State,
        transition: <Self::Reference as ReferenceStateMachine>::Transition,
    ) -> Self::SystemUnderTest {
        let effects = state.session.apply(transition);
        for effect in &effects {
            match effect {
                Effect::RequestFork => state.fork_requests += 1,
                Effect::ForeignForkDiscovered { fork_id } => {
                    if state.session.owns(fork_id) {
                        state.own_fork_discovered = true;
                    }
                }
                Effect::RequestMerge { fork_room_id } => {
                    if state.session.owns(fork_room_id) {
                        state.own_fork_merge = true;
                    }
                }
                _ => {}
            }
        }
        state
    }

    fn check_invariants(
        state: &Self::SystemUnderTest,
        ref_state: &<Self::Reference as ReferenceStateMachine>::State,
    ) {
        // The myForkId cell tracks the model exactly.
        match state.session.my_fork() {
            OwnFork::None => assert_eq!(ref_state.my_fork, ""),
            OwnFork::Pending => assert_eq!(ref_state.my_fork, "pending"),
            OwnFork::Assigned(id) => assert_eq!(&ref_state.my_fork, id),
        }

        // Fork requests fire exactly when the model says myForkId was empty.
        assert_eq!(
            state.fork_requests, ref_state.fork_requests,
            "fork request count diverged from the model"
        );

        // The own fork never surfaces as foreign and is never merged.
        assert!(!state.own_fork_discovered, "own fork offered for review");
        assert!(!state.own_fork_merge, "merge requested for own fork");

        // Mode, room and ownership stay mutually consistent.
        match state.session.mode() {
            ClientMode::SuggestionActive { fork_id } => {
                assert!(state.session.owns(fork_id));
                assert_eq!(
                    state.session.current_room(),
                    &RoomTarget::Fork(fork_id.clone())
                );
            }
            ClientMode::Reviewing { fork_id } => {
                assert!(!state.session.owns(fork_id));
                assert_eq!(
                    state.session.current_room(),
                    &RoomTarget::Fork(fork_id.clone())
                );
            }
            ClientMode::Editing | ClientMode::SuggestionPending => {}
        }
    }
}

proptest_state_machine::prop_state_machine! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn test_session_state_machine(sequential 1..40 => SessionUnderTest);
}
