//! Persisted snapshot records

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Steam application id
pub type AppId = u64;

/// Base URL of Steam community app icons
pub const ICON_URL_BASE: &str = "http://media.steampowered.com/steamcommunity/public/images/apps";

/// Build the icon URL for an app from the hash reported by the API.
pub fn icon_url(entity_id: AppId, icon_hash: &str) -> String {
    format!("{}/{}/{}.jpg", ICON_URL_BASE, entity_id, icon_hash)
}

/// One game as captured in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotGame {
    pub entity_id: AppId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub icon_hash: String,
    /// Lifetime playtime in minutes at fetch time
    pub total_minutes: u64,
    /// Playtime over the source's recent window (two weeks) in minutes
    #[serde(default)]
    pub recent_minutes: u64,
}

/// One dated capture of cumulative totals for a tracked identity.
///
/// `date` is the day the totals are attributed to, which is the day
/// before the fetch was issued.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub fetched_at: DateTime<Utc>,
    pub games: Vec<SnapshotGame>,
}

impl Snapshot {
    pub fn new(date: NaiveDate, games: Vec<SnapshotGame>) -> Self {
        Self {
            date,
            fetched_at: Utc::now(),
            games,
        }
    }

    /// Snapshot for a fetch issued on `today`, attributed to yesterday.
    pub fn for_fetch(today: NaiveDate, games: Vec<SnapshotGame>) -> Self {
        Self::new(today - chrono::Duration::days(1), games)
    }

    /// File name used as the record key
    pub fn file_name(&self) -> String {
        format!("{}.json", self.date.format("%Y-%m-%d"))
    }
}
