use ong_types::SessionConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("LiveKit API error: {0}")]
    LiveKit(#[from] livekit_api::access_token::AccessTokenError),

    #[error("Room service error: {0}")]
    RoomService(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error(transparent)]
    Incomplete(#[from] SessionConfigError),

    #[error("Avatar service error: {0}")]
    Avatar(String),

    #[error("Model session error: {0}")]
    Model(String),
}
