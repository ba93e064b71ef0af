//! Test helpers shared by unit and integration tests.

use crate::review::{DecisionSurface, MergeService, ReviewChoice};
use crate::service::{SessionSnapshot, SuggestionHandle};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Initialize tracing for tests; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Decision surface answering from a scripted queue.
///
/// Answers are consumed in order; an exhausted queue answers `Discard`.
/// When gated, each prompt waits for one permit before answering, letting
/// tests interleave other events with an open dialog.
pub struct ScriptedSurface {
    answers: Mutex<VecDeque<ReviewChoice>>,
    prompts: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSurface {
    pub fn new(answers: Vec<ReviewChoice>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            prompts: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// A surface whose prompts block until `release` permits are added.
    pub fn gated(answers: Vec<ReviewChoice>) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let surface = Self {
            answers: Mutex::new(answers.into()),
            prompts: Mutex::new(Vec::new()),
            gate: Some(gate.clone()),
        };
        (surface, gate)
    }

    /// Fork ids prompted so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionSurface for ScriptedSurface {
    async fn offer_review(&self, fork_id: &str) -> ReviewChoice {
        self.prompts.lock().unwrap().push(fork_id.to_string());
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ReviewChoice::Discard)
    }
}

/// Merge service that records every request.
#[derive(Default)]
pub struct RecordingMerge {
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingMerge {
    /// `(current_room_id, root_room_id)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl MergeService for RecordingMerge {
    fn request_merge(&self, current_room_id: &str, root_room_id: &str) {
        self.calls
            .lock()
            .unwrap()
            .push((current_room_id.to_string(), root_room_id.to_string()));
    }
}

/// Wait until the published session state satisfies `pred`.
///
/// Panics after five seconds; only for tests.
pub async fn wait_for_snapshot(
    handle: &SuggestionHandle,
    pred: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    let mut rx = handle.watch();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for session state")
        .expect("session ended while waiting");
    snapshot.clone()
}
