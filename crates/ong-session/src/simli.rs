//! Simli avatar participants.
//!
//! The avatar joins the LiveKit room on its own using a join token minted
//! here. Simli enforces the session and idle ceilings itself; releasing the
//! avatar removes its participant from the room.

use crate::backend::{AvatarBackend, AvatarSession, RoomInfo};
use crate::config::AvatarServiceConfig;
use crate::error::SessionError;
use crate::room::RoomService;
use async_trait::async_trait;
use ong_types::SessionConfig;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Participant identity the avatar uses in every room.
pub const AVATAR_IDENTITY: &str = "simli-avatar-agent";

pub const JOIN_PATH: &str = "/integrations/livekit/agents";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimliSessionConfig<'a> {
    api_key: &'a str,
    face_id: &'a str,
    sync_audio: bool,
    handle_silence: bool,
    max_session_length: u64,
    max_idle_time: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinRequest<'a> {
    config: SimliSessionConfig<'a>,
    livekit_url: &'a str,
    livekit_token: String,
}

pub struct SimliBackend {
    http: reqwest::Client,
    config: AvatarServiceConfig,
    rooms: Arc<RoomService>,
}

impl SimliBackend {
    pub fn new(config: AvatarServiceConfig, rooms: Arc<RoomService>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            config,
            rooms,
        }
    }
}

impl AvatarBackend for SimliBackend {
    fn create(&self, config: &SessionConfig) -> Box<dyn AvatarSession> {
        Box::new(SimliAvatar {
            http: self.http.clone(),
            service: self.config.clone(),
            rooms: Arc::clone(&self.rooms),
            api_key: config.credentials().avatar_api_key.clone(),
            face_id: config.credentials().avatar_face_id.clone(),
            joined_room: None,
        })
    }
}

/// One avatar participant.
pub struct SimliAvatar {
    http: reqwest::Client,
    service: AvatarServiceConfig,
    rooms: Arc<RoomService>,
    api_key: String,
    face_id: String,
    joined_room: Option<String>,
}

impl SimliAvatar {
    fn join_url(&self) -> String {
        format!("{}{}", self.service.api_url.trim_end_matches('/'), JOIN_PATH)
    }
}

#[async_trait]
impl AvatarSession for SimliAvatar {
    async fn start(&mut self, room: &RoomInfo) -> Result<(), SessionError> {
        let token = self.rooms.generate_join_token(
            &room.name,
            AVATAR_IDENTITY,
            &self.service.participant_name,
        )?;

        let request = JoinRequest {
            config: SimliSessionConfig {
                api_key: &self.api_key,
                face_id: &self.face_id,
                sync_audio: true,
                handle_silence: true,
                max_session_length: self.service.max_session_length_secs,
                max_idle_time: self.service.max_idle_time_secs,
            },
            livekit_url: self.rooms.get_url(),
            livekit_token: token,
        };

        // Recorded before the request: a start dropped mid-flight may still
        // have joined, so close must attempt the removal.
        self.joined_room = Some(room.name.clone());
        let response = match self.http.post(self.join_url()).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                self.joined_room = None;
                return Err(SessionError::Avatar(format!("join request failed: {}", e)));
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.joined_room = None;
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::Avatar(format!(
                "join rejected with HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        info!(
            room = %room.name,
            max_session_secs = self.service.max_session_length_secs,
            max_idle_secs = self.service.max_idle_time_secs,
            "avatar joined room"
        );
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        match self.joined_room.take() {
            Some(room) => self.rooms.remove_participant(&room, AVATAR_IDENTITY).await,
            None => Ok(()),
        }
    }
}
