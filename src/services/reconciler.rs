//! Daily playtime reconciliation
//!
//! Turns sparse cumulative totals into per-day deltas. A day only gets an
//! entry for a game when that day's snapshot reports the game; the delta is
//! taken against the most recent earlier total, so activity during days
//! without snapshots lands on the day the fetch resumed instead of being
//! dropped.

use crate::types::{AppId, EntityDelta, EntityHistory};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the first observed day of a game is attributed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstSeenPolicy {
    /// The whole lifetime total surfaces on the first observed day
    #[default]
    Lifetime,
    /// Only the source's recent-window minutes surface on the first day
    RecentWindow,
}

/// Oldest date recorded for any game
pub fn horizon(histories: &BTreeMap<AppId, EntityHistory>) -> Option<NaiveDate> {
    histories.values().filter_map(|h| h.first_date()).min()
}

/// Delta computation over one merged history set
pub struct Reconciler<'a> {
    histories: &'a BTreeMap<AppId, EntityHistory>,
    horizon: Option<NaiveDate>,
    first_seen: FirstSeenPolicy,
}

impl<'a> Reconciler<'a> {
    pub fn new(histories: &'a BTreeMap<AppId, EntityHistory>) -> Self {
        Self::with_policy(histories, FirstSeenPolicy::default())
    }

    pub fn with_policy(
        histories: &'a BTreeMap<AppId, EntityHistory>,
        first_seen: FirstSeenPolicy,
    ) -> Self {
        Self {
            histories,
            horizon: horizon(histories),
            first_seen,
        }
    }

    /// Non-zero playtime deltas for `target`, in app id order.
    pub fn daily_delta(&self, target: NaiveDate) -> Vec<EntityDelta> {
        let mut deltas = Vec::new();

        for history in self.histories.values() {
            // Not reported that day: no attributable total
            let Some(&current) = history.total.get(&target) else {
                continue;
            };

            let delta_minutes = if self.first_seen == FirstSeenPolicy::RecentWindow
                && history.first_date() == Some(target)
            {
                minutes(history.recent.get(&target).copied().unwrap_or(current))
            } else {
                minutes(current).saturating_sub(minutes(self.reference_total(history, target)))
            };

            if delta_minutes != 0 {
                deltas.push(EntityDelta {
                    entity_id: history.entity_id,
                    delta_minutes,
                });
            }
        }

        deltas
    }

    /// Most recent total strictly before `target`, never looking past the
    /// horizon. Games with nothing recorded earlier start from zero.
    fn reference_total(&self, history: &EntityHistory, target: NaiveDate) -> u64 {
        let Some(horizon) = self.horizon else {
            return 0;
        };
        if target <= horizon {
            return 0;
        }
        history
            .total
            .range(horizon..target)
            .next_back()
            .map(|(_, &total)| total)
            .unwrap_or(0)
    }
}

/// Totals beyond `i64::MAX` saturate instead of wrapping
fn minutes(total: u64) -> i64 {
    i64::try_from(total).unwrap_or(i64::MAX)
}

/// Non-zero deltas for one day with the default first-seen policy
pub fn compute_daily_delta(
    histories: &BTreeMap<AppId, EntityHistory>,
    target: NaiveDate,
) -> Vec<EntityDelta> {
    Reconciler::new(histories).daily_delta(target)
}
