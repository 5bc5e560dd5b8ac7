//! Derived per-game playtime history

use super::AppId;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Cumulative totals observed for one game, keyed by snapshot date.
///
/// A missing date means the game was absent from that day's report
/// (or there was no snapshot), never zero minutes.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntityHistory {
    pub entity_id: AppId,
    pub name: Option<String>,
    pub icon_url: String,
    pub total: BTreeMap<NaiveDate, u64>,
    pub recent: BTreeMap<NaiveDate, u64>,
}

impl EntityHistory {
    pub fn new(entity_id: AppId, name: Option<String>, icon_url: String) -> Self {
        Self {
            entity_id,
            name,
            icon_url,
            total: BTreeMap::new(),
            recent: BTreeMap::new(),
        }
    }

    /// Earliest date with a recorded total
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.total.keys().next().copied()
    }

    /// True when more than one distinct total was ever recorded
    pub fn has_change(&self) -> bool {
        let distinct: HashSet<u64> = self.total.values().copied().collect();
        distinct.len() > 1
    }
}

/// Per-game playtime change attributed to a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityDelta {
    pub entity_id: AppId,
    /// May be negative when the source counter regressed
    pub delta_minutes: i64,
}
