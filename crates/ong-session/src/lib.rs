//! Session lifecycle for the Ong conversational avatar.
//!
//! A room session pairs two external participants: a Simli avatar that
//! renders a talking face into a LiveKit room, and a Gemini Live model that
//! carries the conversation. [`SessionController`] resolves credentials and
//! remote settings, starts both, sends a greeting, waits for the session to
//! end and releases both handles in a fixed order.
//!
//! The external services sit behind the traits in [`backend`], so the
//! controller can be driven by the production backends ([`RoomService`],
//! [`SimliBackend`], [`GeminiLiveBackend`]) or by test doubles.
//!
//! Failure handling follows one rule: anything that fails before a resource
//! is acquired aborts the session, anything after the model has started is
//! logged and tolerated, and cleanup always runs.

pub mod backend;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod gemini;
pub mod room;
pub mod settings;
pub mod simli;

pub use backend::{
    AvatarBackend, AvatarSession, ModelBackend, ModelSession, RoomGateway, RoomInfo,
};
pub use config::{
    AvatarServiceConfig, LiveKitConfig, ModelServiceConfig, SessionOptions,
    SettingsEndpointConfig, GREETING_INSTRUCTIONS,
};
pub use controller::{await_termination, SessionController, SessionDeps, SessionOutcome};
pub use credentials::{resolve_credentials, AvatarCredentials, ModelKeys, MODEL_KEY_SLOTS};
pub use error::SessionError;
pub use gemini::GeminiLiveBackend;
pub use room::RoomService;
pub use settings::{fetch_remote_settings, SettingsClient};
pub use simli::SimliBackend;
