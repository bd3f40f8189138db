//! The per-room session controller.
//!
//! One controller drives one room session through
//! `INIT → CONNECTED → CONFIG_RESOLVED → AVATAR_STARTED → MODEL_STARTED →
//! GREETED → AWAITING_CLOSE → CLEANING_UP → ENDED`. Any failure or
//! termination jumps to `CLEANING_UP`, which always releases the avatar and
//! then the model session.

use crate::backend::{
    AvatarBackend, AvatarSession, ModelBackend, ModelSession, RoomGateway, RoomInfo,
};
use crate::config::SessionOptions;
use crate::credentials::{resolve_credentials, AvatarCredentials, ModelKeys};
use crate::error::SessionError;
use crate::settings::SettingsClient;
use ong_types::{
    key_index_from_metadata, SessionConfig, SessionEvent, SessionState, TerminationReason,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Everything a controller needs from the outside world. Cheap to clone; the
/// worker keeps one and hands a clone to every job.
#[derive(Clone)]
pub struct SessionDeps {
    pub rooms: Arc<dyn RoomGateway>,
    pub avatars: Arc<dyn AvatarBackend>,
    pub models: Arc<dyn ModelBackend>,
    pub settings: SettingsClient,
    pub avatar_credentials: AvatarCredentials,
    pub model_keys: ModelKeys,
}

/// How a session ended.
#[derive(Debug)]
pub struct SessionOutcome {
    pub room_name: String,
    /// The last state reached before cleanup began.
    pub reached: SessionState,
    /// Set when the session ran to the termination wait.
    pub termination: Option<TerminationReason>,
    /// Set when the session was aborted before the termination wait.
    pub failure: Option<SessionError>,
}

impl SessionOutcome {
    /// Whether the session was aborted by a failure rather than ending normally.
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

pub struct SessionController {
    room_name: String,
    deps: SessionDeps,
    options: SessionOptions,
    state: SessionState,
}

impl SessionController {
    pub fn new(room_name: impl Into<String>, deps: SessionDeps, options: SessionOptions) -> Self {
        Self {
            room_name: room_name.into(),
            deps,
            options,
            state: SessionState::Init,
        }
    }

    /// Runs the session to completion.
    ///
    /// Cancelling `cancel` ends the termination wait; cleanup still runs
    /// before this returns.
    pub async fn run(self, cancel: CancellationToken) -> SessionOutcome {
        let span = tracing::info_span!("session", room = %self.room_name);
        self.run_inner(cancel).instrument(span).await
    }

    async fn run_inner(mut self, cancel: CancellationToken) -> SessionOutcome {
        info!("starting avatar session");

        let mut avatar = None;
        let mut model = None;
        let result = self.drive(&mut avatar, &mut model, &cancel).await;
        let reached = self.state;

        if let Err(e) = &result {
            error!(state = %reached, "session aborted: {}", e);
        }

        self.advance(SessionState::CleaningUp);
        self.cleanup(avatar, model).await;
        self.advance(SessionState::Ended);
        info!("avatar session ended");

        let (termination, failure) = match result {
            Ok(reason) => (Some(reason), None),
            Err(e) => (None, Some(e)),
        };
        SessionOutcome {
            room_name: self.room_name,
            reached,
            termination,
            failure,
        }
    }

    async fn drive(
        &mut self,
        avatar_slot: &mut Option<Box<dyn AvatarSession>>,
        model_slot: &mut Option<Box<dyn ModelSession>>,
        cancel: &CancellationToken,
    ) -> Result<TerminationReason, SessionError> {
        let Some(room) = until_cancelled(cancel, self.deps.rooms.connect(&self.room_name)).await
        else {
            return Ok(self.cancelled_during_startup());
        };
        let room = room?;
        self.advance(SessionState::Connected);

        let Some(config) = until_cancelled(cancel, self.resolve_config(&room)).await else {
            return Ok(self.cancelled_during_startup());
        };
        let config = config?;
        self.advance(SessionState::ConfigResolved);

        let avatar = avatar_slot.insert(self.deps.avatars.create(&config));
        let model = model_slot.insert(self.deps.models.create(&config));
        let mut events = model.subscribe();

        let Some(started) = until_cancelled(cancel, avatar.start(&room)).await else {
            return Ok(self.cancelled_during_startup());
        };
        started?;
        self.advance(SessionState::AvatarStarted);

        let Some(started) = until_cancelled(cancel, model.start(&room)).await else {
            return Ok(self.cancelled_during_startup());
        };
        started?;
        self.advance(SessionState::ModelStarted);
        info!("agent is now active and ready to chat");

        let greeting = model.generate_reply(&self.options.greeting_instructions);
        let Some(greeting) = until_cancelled(cancel, greeting).await else {
            return Ok(self.cancelled_during_startup());
        };
        match greeting {
            Ok(()) => self.advance(SessionState::Greeted),
            Err(e) => warn!("failed to generate initial greeting: {}", e),
        }

        self.advance(SessionState::AwaitingClose);
        Ok(await_termination(&mut events, cancel).await)
    }

    fn cancelled_during_startup(&self) -> TerminationReason {
        info!(state = %self.state, "session cancelled during startup");
        TerminationReason::Cancelled
    }

    async fn resolve_config(&self, room: &RoomInfo) -> Result<SessionConfig, SessionError> {
        let selector = key_index_from_metadata(&room.metadata);
        let (credentials, source) = resolve_credentials(
            &self.deps.avatar_credentials,
            &self.deps.model_keys,
            selector,
        )?;
        info!(key_index = selector, key_source = %source, "selected model key");

        let settings = self.deps.settings.fetch().await;
        info!(voice = %settings.voice, "using voice");

        Ok(SessionConfig::new(
            &self.room_name,
            credentials,
            selector,
            source,
            settings,
        )?)
    }

    async fn cleanup(
        &self,
        avatar: Option<Box<dyn AvatarSession>>,
        model: Option<Box<dyn ModelSession>>,
    ) {
        info!("cleaning up session");
        let limit = self.options.cleanup_step_timeout;

        if let Some(mut avatar) = avatar {
            release("avatar", avatar.close(), limit).await;
        }
        if let Some(mut model) = model {
            release("model session", model.close(), limit).await;
        }
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal session transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "session state");
        self.state = next;
    }
}

/// Polls `step` unless `cancel` fires first, in which case `step` is dropped.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, step: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        output = step => Some(output),
    }
}

/// Waits for the first of: a `Closed` event, an `Error` event, or cancellation.
pub async fn await_termination(
    events: &mut broadcast::Receiver<SessionEvent>,
    cancel: &CancellationToken,
) -> TerminationReason {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("session cancelled");
                return TerminationReason::Cancelled;
            }
            received = events.recv() => match received {
                Ok(event) => {
                    match &event {
                        SessionEvent::Closed => info!("session close event received"),
                        SessionEvent::Error(message) => error!("session error: {}", message),
                    }
                    return event.into();
                }
                Err(RecvError::Closed) => {
                    info!("session event channel closed");
                    return TerminationReason::Closed;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session event receiver lagged");
                }
            }
        }
    }
}

async fn release<F>(what: &str, close: F, limit: Duration)
where
    F: Future<Output = Result<(), SessionError>>,
{
    match tokio::time::timeout(limit, close).await {
        Ok(Ok(())) => debug!("released {}", what),
        Ok(Err(e)) => warn!("error closing {}: {}", what, e),
        Err(_) => warn!(
            timeout_secs = limit.as_secs_f32(),
            "timed out closing {}", what
        ),
    }
}
