//! Steam Web API snapshot fetcher
//!
//! Pulls the current cumulative playtime totals for one account from
//! `IPlayerService/GetRecentlyPlayedGames`. Failures are reported to the
//! caller and never retried here.

use crate::types::{PlaytrackError, Result, SnapshotGame};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Steam Web API base URL
pub const STEAM_API_BASE: &str = "http://api.steampowered.com";

const RECENTLY_PLAYED_PATH: &str = "/IPlayerService/GetRecentlyPlayedGames/v0001/";

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

const USER_AGENT: &str = concat!("playtrack/", env!("CARGO_PKG_VERSION"));

/// Source of cumulative playtime totals for a tracked identity
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current totals for `identity` (a Steam id)
    fn fetch(&self, identity: &str) -> Result<Vec<SnapshotGame>>;
}

/// Top-level Steam response envelope
#[derive(Debug, Deserialize)]
pub(crate) struct RecentlyPlayedResponse {
    #[serde(default)]
    pub response: RecentlyPlayed,
}

/// `response` body; Steam omits `games` entirely when nothing was played
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RecentlyPlayed {
    #[serde(default)]
    pub games: Vec<SteamGame>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SteamGame {
    pub appid: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub img_icon_url: String,
    #[serde(default)]
    pub playtime_forever: u64,
    #[serde(default)]
    pub playtime_2weeks: u64,
}

impl From<SteamGame> for SnapshotGame {
    fn from(game: SteamGame) -> Self {
        Self {
            entity_id: game.appid,
            name: game.name,
            icon_hash: game.img_icon_url,
            total_minutes: game.playtime_forever,
            recent_minutes: game.playtime_2weeks,
        }
    }
}

/// Steam Web API client for one API key
pub struct SteamClient {
    api_key: String,
    base_url: String,
}

impl SteamClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, STEAM_API_BASE)
    }

    /// Create a client against a custom endpoint (mirrors, testing)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request_url(&self) -> String {
        format!("{}{}", self.base_url, RECENTLY_PLAYED_PATH)
    }

    /// Decode a response body into snapshot games
    pub(crate) fn parse_body(body: &str) -> Result<Vec<SnapshotGame>> {
        let parsed: RecentlyPlayedResponse = serde_json::from_str(body)
            .map_err(|e| PlaytrackError::Fetch(format!("JSON parse error: {}", e)))?;
        Ok(parsed
            .response
            .games
            .into_iter()
            .map(SnapshotGame::from)
            .collect())
    }
}

impl fmt::Debug for SteamClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SteamClient")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl SnapshotSource for SteamClient {
    fn fetch(&self, identity: &str) -> Result<Vec<SnapshotGame>> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PlaytrackError::Fetch(format!("HTTP client error: {}", e)))?;

        let response = client
            .get(self.request_url())
            .query(&[
                ("key", self.api_key.as_str()),
                ("steamid", identity),
                ("format", "json"),
            ])
            .send()
            .map_err(|e| {
                PlaytrackError::Fetch(format!("HTTP request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(PlaytrackError::Fetch(format!(
                "{}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown status")
            )));
        }

        let body = response
            .text()
            .map_err(|e| {
                PlaytrackError::Fetch(format!("Failed to read body: {}", e.without_url()))
            })?;
        Self::parse_body(&body)
    }
}
