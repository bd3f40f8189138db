//! Shared types for the Ong avatar agent.
//!
//! This crate holds the values that flow between the session controller and
//! the worker process: the resolved session configuration, the remote avatar
//! settings, room metadata, and the lifecycle states and events of a single
//! room session.
//!
//! Nothing in here performs I/O. The controller in `ong-session` owns all
//! interaction with external services.

pub mod session;
pub mod settings;

pub use session::{CredentialSet, ModelKeySource, SessionConfig, SessionConfigError};
pub use settings::{
    key_index_from_metadata, AvatarSettings, RoomMetadata, DEFAULT_INSTRUCTIONS, DEFAULT_VOICE,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of one room session.
///
/// The happy path walks the states in declaration order. Every state before
/// `CleaningUp` may jump straight to `CleaningUp` on failure or termination;
/// teardown is never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Init,
    Connected,
    ConfigResolved,
    AvatarStarted,
    ModelStarted,
    Greeted,
    AwaitingClose,
    CleaningUp,
    Ended,
}

impl SessionState {
    /// Returns the wire/log representation of this state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Connected => "CONNECTED",
            Self::ConfigResolved => "CONFIG_RESOLVED",
            Self::AvatarStarted => "AVATAR_STARTED",
            Self::ModelStarted => "MODEL_STARTED",
            Self::Greeted => "GREETED",
            Self::AwaitingClose => "AWAITING_CLOSE",
            Self::CleaningUp => "CLEANING_UP",
            Self::Ended => "ENDED",
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Init, Connected)
            | (Connected, ConfigResolved)
            | (ConfigResolved, AvatarStarted)
            | (AvatarStarted, ModelStarted)
            | (ModelStarted, Greeted)
            | (Greeted, AwaitingClose)
            | (CleaningUp, Ended) => true,
            // The greeting is optional: a failed greeting still waits for close.
            (ModelStarted, AwaitingClose) => true,
            (from, CleaningUp) => !matches!(from, CleaningUp | Ended),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by a running model session that end the room session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The model session closed (user left, room ended, remote hangup).
    Closed,
    /// The model session reported an error.
    Error(String),
}

/// Why a session stopped waiting and moved to cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    Closed,
    Error(String),
    /// The worker cancelled the job (shutdown or room finished).
    Cancelled,
}

impl From<SessionEvent> for TerminationReason {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Closed => Self::Closed,
            SessionEvent::Error(message) => Self::Error(message),
        }
    }
}
