use crate::backend::{RoomGateway, RoomInfo};
use crate::config::LiveKitConfig;
use crate::error::SessionError;
use async_trait::async_trait;
use livekit_api::access_token::{AccessToken, VideoGrants};
use livekit_api::services::room::RoomClient;
use livekit_protocol::Room;
use std::time::Duration;
use tracing::debug;

/// LiveKit room service access used by the agent.
#[derive(Debug)]
pub struct RoomService {
    config: LiveKitConfig,
    room_client: RoomClient,
}

impl RoomService {
    pub fn new(config: LiveKitConfig) -> Self {
        let room_client =
            RoomClient::with_api_key(&config.url, &config.api_key, &config.api_secret);
        Self {
            config,
            room_client,
        }
    }

    pub fn get_url(&self) -> &str {
        &self.config.url
    }

    /// Returns the room named `name`, or `RoomNotFound` if it does not exist.
    pub async fn fetch_room(&self, name: &str) -> Result<Room, SessionError> {
        let rooms = self
            .room_client
            .list_rooms(vec![name.to_string()])
            .await
            .map_err(|e| SessionError::RoomService(e.to_string()))?;

        rooms
            .into_iter()
            .find(|room| room.name == name)
            .ok_or_else(|| SessionError::RoomNotFound(name.to_string()))
    }

    pub fn generate_join_token(
        &self,
        room_name: &str,
        participant_identity: &str,
        participant_name: &str,
    ) -> Result<String, SessionError> {
        let token = AccessToken::with_api_key(&self.config.api_key, &self.config.api_secret)
            .with_identity(participant_identity)
            .with_name(participant_name)
            .with_grants(VideoGrants {
                room_join: true,
                room: room_name.to_string(),
                can_publish: true,
                can_subscribe: true,
                can_publish_data: true,
                ..Default::default()
            })
            .with_ttl(Duration::from_secs(self.config.token_ttl_seconds));

        token.to_jwt().map_err(SessionError::LiveKit)
    }

    pub async fn remove_participant(&self, room: &str, identity: &str) -> Result<(), SessionError> {
        self.room_client
            .remove_participant(room, identity)
            .await
            .map_err(|e| SessionError::RoomService(e.to_string()))
    }
}

#[async_trait]
impl RoomGateway for RoomService {
    async fn connect(&self, room_name: &str) -> Result<RoomInfo, SessionError> {
        let room = self.fetch_room(room_name).await?;
        debug!(room = %room.name, sid = %room.sid, "found room");
        Ok(RoomInfo {
            sid: room.sid,
            name: room.name,
            metadata: room.metadata,
        })
    }
}
