//! Room job dispatch.
//!
//! LiveKit notifies the worker through webhooks. `room_started` spawns one
//! [`SessionController`] per room, `room_finished` cancels it. Jobs run on a
//! [`TaskTracker`] so shutdown can wait for their cleanup.

use crate::config::{Config, Secrets};
use axum::extract::Extension;
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use livekit_api::access_token::TokenVerifier;
use livekit_api::webhooks::WebhookReceiver;
use livekit_protocol::WebhookEvent;
use ong_session::{
    GeminiLiveBackend, RoomService, SessionController, SessionDeps, SessionOptions,
    SettingsClient, SimliBackend,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Shared worker state, handed to handlers through an `Extension`.
pub struct WorkerState {
    pub deps: SessionDeps,
    pub options: SessionOptions,
    pub webhooks: WebhookReceiver,
    /// Cancelled once on shutdown; every job token is a child of it.
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    /// Active jobs by room name. std Mutex: never held across an await.
    active: Mutex<HashMap<String, Job>>,
    next_job_id: AtomicU64,
}

/// A running room job. The id tells a job's own entry apart from a newer
/// job for the same room.
struct Job {
    id: u64,
    cancel: CancellationToken,
}

/// What a webhook event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A job was started for the room.
    Started,
    /// The room already has a running job.
    Duplicate,
    /// The room's job was told to end.
    Cancelled,
    /// `room_finished` for a room with no job.
    NoJob,
    /// The worker is shutting down and accepts no new jobs.
    Draining,
    /// An event this worker does not act on.
    Ignored,
}

impl WorkerState {
    pub fn new(deps: SessionDeps, options: SessionOptions, webhooks: WebhookReceiver) -> Self {
        Self {
            deps,
            options,
            webhooks,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            active: Mutex::new(HashMap::new()),
            next_job_id: AtomicU64::new(0),
        }
    }

    /// Wires the production backends from validated configuration.
    pub fn from_config(config: &Config, secrets: Secrets) -> Self {
        let rooms = Arc::new(RoomService::new(config.livekit.clone()));
        let deps = SessionDeps {
            rooms: rooms.clone(),
            avatars: Arc::new(SimliBackend::new(config.avatar.clone(), rooms)),
            models: Arc::new(GeminiLiveBackend::new(config.model.clone())),
            settings: SettingsClient::from_config(&config.settings),
            avatar_credentials: secrets.avatar,
            model_keys: secrets.model_keys,
        };
        let verifier =
            TokenVerifier::with_api_key(&config.livekit.api_key, &config.livekit.api_secret);
        Self::new(
            deps,
            config.worker.session_options(),
            WebhookReceiver::new(verifier),
        )
    }

    /// Rooms with a running job.
    pub fn active_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self.lock_active().keys().cloned().collect();
        rooms.sort();
        rooms
    }

    fn lock_active(&self) -> std::sync::MutexGuard<'_, HashMap<String, Job>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Starts a session job for `room_name` unless one is already running.
pub fn dispatch(state: &Arc<WorkerState>, room_name: &str) -> Dispatch {
    if state.shutdown.is_cancelled() {
        warn!(room = room_name, "worker is draining, job refused");
        return Dispatch::Draining;
    }

    let token = state.shutdown.child_token();
    let job_id = state.next_job_id.fetch_add(1, Ordering::Relaxed);
    {
        let mut active = state.lock_active();
        if active.contains_key(room_name) {
            debug!(room = room_name, "job already running for room");
            return Dispatch::Duplicate;
        }
        active.insert(
            room_name.to_string(),
            Job {
                id: job_id,
                cancel: token.clone(),
            },
        );
    }

    let controller = SessionController::new(room_name, state.deps.clone(), state.options.clone());
    let job_state = Arc::clone(state);
    state.tracker.spawn(async move {
        let outcome = controller.run(token).await;
        {
            let mut active = job_state.lock_active();
            if active.get(&outcome.room_name).is_some_and(|job| job.id == job_id) {
                active.remove(&outcome.room_name);
            }
        }
        match (&outcome.failure, &outcome.termination) {
            (Some(e), _) => error!(
                room = %outcome.room_name,
                reached = %outcome.reached,
                "job failed: {}",
                e
            ),
            (None, reason) => info!(
                room = %outcome.room_name,
                reason = ?reason,
                "job finished"
            ),
        }
    });

    info!(room = room_name, "job dispatched");
    Dispatch::Started
}

/// Cancels the job for `room_name`, if any. Cleanup continues in the job,
/// but the room name is free for a new job immediately.
pub fn cancel_room(state: &WorkerState, room_name: &str) -> Dispatch {
    let job = state.lock_active().remove(room_name);
    match job {
        Some(job) => {
            job.cancel.cancel();
            info!(room = room_name, "job cancelled");
            Dispatch::Cancelled
        }
        None => Dispatch::NoJob,
    }
}

/// Acts on a verified webhook event.
pub fn handle_event(state: &Arc<WorkerState>, event: &WebhookEvent) -> Dispatch {
    let room_name = event.room.as_ref().map(|room| room.name.as_str());
    match (event.event.as_str(), room_name) {
        ("room_started", Some(name)) if !name.is_empty() => dispatch(state, name),
        ("room_finished", Some(name)) if !name.is_empty() => cancel_room(state, name),
        (kind, _) => {
            debug!(event = kind, "webhook event ignored");
            Dispatch::Ignored
        }
    }
}

/// Health check handler.
async fn health(Extension(state): Extension<Arc<WorkerState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_jobs": state.active_rooms().len(),
    }))
}

/// Receives LiveKit webhooks. The `Authorization` header carries a token
/// signed with the LiveKit API secret over the body hash.
async fn webhook(
    Extension(state): Extension<Arc<WorkerState>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let Some(auth) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        warn!("webhook without authorization header rejected");
        return StatusCode::UNAUTHORIZED;
    };
    let auth = auth.strip_prefix("Bearer ").unwrap_or(auth);

    match state.webhooks.receive(&body, auth) {
        Ok(event) => {
            let dispatch = handle_event(&state, &event);
            debug!(event = %event.event, ?dispatch, "webhook handled");
            StatusCode::OK
        }
        Err(e) => {
            warn!("webhook rejected: {}", e);
            StatusCode::UNAUTHORIZED
        }
    }
}

/// Builds the worker router.
pub fn app(state: Arc<WorkerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .layer(Extension(state))
}

/// Cancels every job and waits up to `timeout` for their cleanup.
///
/// Returns `true` when all jobs finished in time.
pub async fn drain(state: &WorkerState, timeout: Duration) -> bool {
    info!(jobs = state.tracker.len(), "draining room jobs");
    state.shutdown.cancel();
    state.tracker.close();

    match tokio::time::timeout(timeout, state.tracker.wait()).await {
        Ok(()) => {
            info!("all room jobs finished");
            true
        }
        Err(_) => {
            warn!(
                jobs = state.tracker.len(),
                "room jobs still running after {} seconds",
                timeout.as_secs()
            );
            false
        }
    }
}
