//! Seams between the session controller and the external services.
//!
//! Each external collaborator is reached through a backend that creates a
//! per-session handle. Creating a handle has no side effects; `start` is the
//! first call that touches the network, and `close` must be safe to call on a
//! handle that never started.

use crate::error::SessionError;
use async_trait::async_trait;
use ong_types::{SessionConfig, SessionEvent};
use tokio::sync::broadcast;

/// Default capacity for a model session's event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 16;

/// A room as seen by the controller after it connects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomInfo {
    pub sid: String,
    pub name: String,
    /// Raw metadata string attached to the room, possibly empty.
    pub metadata: String,
}

/// The media platform hosting rooms.
#[async_trait]
pub trait RoomGateway: Send + Sync {
    /// Looks up a room and returns its current metadata.
    async fn connect(&self, room_name: &str) -> Result<RoomInfo, SessionError>;
}

/// Creates avatar participants.
pub trait AvatarBackend: Send + Sync {
    fn create(&self, config: &SessionConfig) -> Box<dyn AvatarSession>;
}

/// One avatar participant, exclusively owned by one controller.
#[async_trait]
pub trait AvatarSession: Send {
    /// Joins the avatar to the room as an independent participant.
    async fn start(&mut self, room: &RoomInfo) -> Result<(), SessionError>;

    /// Removes the avatar. A no-op if `start` never succeeded.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Creates conversational model sessions.
pub trait ModelBackend: Send + Sync {
    fn create(&self, config: &SessionConfig) -> Box<dyn ModelSession>;
}

/// One conversational model session, exclusively owned by one controller.
#[async_trait]
pub trait ModelSession: Send {
    /// Subscribes to `Closed` / `Error` events. Subscribe before `start` so no
    /// event can be missed.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;

    async fn start(&mut self, room: &RoomInfo) -> Result<(), SessionError>;

    /// Asks the model to produce one utterance following `instructions`.
    async fn generate_reply(&mut self, instructions: &str) -> Result<(), SessionError>;

    /// Ends the session. A no-op if `start` never succeeded.
    async fn close(&mut self) -> Result<(), SessionError>;
}
