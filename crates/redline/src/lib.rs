pub mod config;
pub mod menu;
pub mod provider;
pub mod review;
pub mod rooms;
pub mod service;
pub mod session;
pub mod testing;
pub mod watcher;

#[cfg(test)]
mod session_pbt;

pub use config::{RepromptPolicy, SessionConfig};
pub use service::{SessionSnapshot, SuggestionHandle, SuggestionService, UserCommand};
pub use session::{ClientMode, ClientSession, Effect, OwnFork, SessionEvent};
