//! Aggregator service for leaderboards and summary statistics

use crate::types::{AppId, DailyResult, EntityDelta, EntityHistory, RankedEntry, ReportStats};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};

/// Aggregator for ranking daily deltas
pub struct Aggregator;

impl Aggregator {
    /// Top `limit` games for one day by delta descending.
    /// Ties keep their input order; `limit == 0` gives an empty board.
    pub fn rank(
        date: NaiveDate,
        mut deltas: Vec<EntityDelta>,
        histories: &BTreeMap<AppId, EntityHistory>,
        limit: usize,
    ) -> DailyResult {
        deltas.sort_by(|a, b| b.delta_minutes.cmp(&a.delta_minutes));
        deltas.truncate(limit);

        let entries = deltas
            .into_iter()
            .map(|d| {
                let history = histories.get(&d.entity_id);
                RankedEntry {
                    entity_id: d.entity_id,
                    name: history.and_then(|h| h.name.clone()),
                    icon_url: history.map(|h| h.icon_url.clone()).unwrap_or_default(),
                    delta_minutes: d.delta_minutes,
                }
            })
            .collect();

        DailyResult { date, entries }
    }

    /// Summary statistics over the full history set
    pub fn stats(histories: &BTreeMap<AppId, EntityHistory>) -> ReportStats {
        let dates: HashSet<NaiveDate> = histories
            .values()
            .flat_map(|h| h.total.keys().copied())
            .collect();

        ReportStats {
            unique_days_observed: dates.len(),
            unique_entities_with_change: histories.values().filter(|h| h.has_change()).count(),
        }
    }
}
