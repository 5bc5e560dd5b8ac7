//! Report types delivered to the presentation boundary

use super::AppId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedEntry {
    pub entity_id: AppId,
    pub name: Option<String>,
    pub icon_url: String,
    pub delta_minutes: i64,
}

/// Leaderboard for one day, sorted by delta descending
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyResult {
    pub date: NaiveDate,
    pub entries: Vec<RankedEntry>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportStats {
    /// Distinct snapshot dates across all histories
    pub unique_days_observed: usize,
    /// Games whose recorded total ever changed
    pub unique_entities_with_change: usize,
}

/// Result of one refresh for a tracked identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaytimeReport {
    pub identity: String,
    pub generated_at: DateTime<Utc>,
    /// Most recent day first
    pub days: Vec<DailyResult>,
    pub stats: ReportStats,
}

impl PlaytimeReport {
    /// Leaderboard for a specific date, if it is inside the report window
    pub fn day(&self, date: NaiveDate) -> Option<&DailyResult> {
        self.days.iter().find(|d| d.date == date)
    }
}
