use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::RoomConfig;
use crate::error::RoomError;
use crate::protocol::{ApiEnvelope, HistoryPayload, SnapshotPayload};
use crate::session::LoadedSession;

/// Where the room loads its snapshot and move history from.
pub trait SnapshotSource: Clone + Send + Sync + 'static {
    fn load(&self, game_id: &str) -> impl Future<Output = Result<LoadedSession, RoomError>> + Send;
}

/// REST client for the game service.
#[derive(Clone)]
pub struct HttpGameApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

/// The history endpoint answers with or without the response envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum MaybeEnveloped<T> {
    Bare(T),
    Enveloped(ApiEnvelope<T>),
}

impl HttpGameApi {
    pub fn new(config: &RoomConfig) -> Result<Self, RoomError> {
        let client = Client::builder()
            .user_agent("GameRoom/1.0")
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.clone(),
            token: config.auth_token.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RoomError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(RoomError::Api("Game not found".to_string()));
        }
        if !resp.status().is_success() {
            return Err(RoomError::Api(format!("HTTP {} from {}", resp.status(), path)));
        }
        Ok(resp.json::<T>().await?)
    }

    pub async fn fetch_snapshot(&self, game_id: &str) -> Result<SnapshotPayload, RoomError> {
        self.get::<ApiEnvelope<SnapshotPayload>>(&format!("/game/{game_id}"))
            .await?
            .into_data()
    }

    pub async fn fetch_history(&self, game_id: &str) -> Result<Vec<HistoryPayload>, RoomError> {
        match self
            .get::<MaybeEnveloped<Vec<HistoryPayload>>>(&format!("/game/{game_id}/moves"))
            .await?
        {
            MaybeEnveloped::Bare(moves) => Ok(moves),
            MaybeEnveloped::Enveloped(envelope) => envelope.into_data(),
        }
    }
}

impl SnapshotSource for HttpGameApi {
    async fn load(&self, game_id: &str) -> Result<LoadedSession, RoomError> {
        let (snapshot, history) =
            tokio::try_join!(self.fetch_snapshot(game_id), self.fetch_history(game_id))?;

        let snapshot = snapshot.into_snapshot(game_id)?;
        let history = history
            .into_iter()
            .map(HistoryPayload::into_entry)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(game_id, moves = history.len(), "Loaded game snapshot");

        Ok(LoadedSession { snapshot, history })
    }
}
