//! Playtime tracking for one identity
//!
//! Two paths share the same reconciliation:
//! - Full cycle: fetch → persist → load all → merge → reconcile → rank
//! - Cache-only: load all → merge → reconcile → rank (no network)

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::config::IdentityConfig;
use crate::services::{
    merge, Aggregator, FirstSeenPolicy, Reconciler, SnapshotSource, SnapshotStore,
};
use crate::types::{AppId, PlaytimeReport, PlaytrackError, Snapshot};

/// Report shaping options for one identity
#[derive(Debug, Clone, Default)]
pub struct ReportSettings {
    pub days_count: usize,
    pub games_count: usize,
    pub excluded: HashSet<AppId>,
    pub first_seen: FirstSeenPolicy,
}

impl From<&IdentityConfig> for ReportSettings {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            days_count: config.days_count,
            games_count: config.games_count,
            excluded: config.excluded(),
            first_seen: config.first_seen,
        }
    }
}

/// Result of the fetch-and-persist half of a cycle
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Snapshot fetched but not persisted; still used for this cycle's report
    pub unsaved: Option<Snapshot>,
    pub errors: Vec<PlaytrackError>,
}

impl FetchOutcome {
    pub fn failed(error: PlaytrackError) -> Self {
        Self {
            unsaved: None,
            errors: vec![error],
        }
    }
}

/// Result of a full cycle
#[derive(Debug)]
pub struct CycleOutcome {
    pub report: PlaytimeReport,
    /// Errors to surface to the user, in the order they occurred
    pub errors: Vec<PlaytrackError>,
}

/// Fetch, persist and reconcile playtime for a single tracked identity
pub struct PlaytimeTracker {
    identity: String,
    store: Arc<SnapshotStore>,
    source: Arc<dyn SnapshotSource>,
    settings: ReportSettings,
}

impl PlaytimeTracker {
    pub fn new(
        identity: impl Into<String>,
        store: Arc<SnapshotStore>,
        source: Arc<dyn SnapshotSource>,
        settings: ReportSettings,
    ) -> Self {
        Self {
            identity: identity.into(),
            store,
            source,
            settings,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Run one full cycle for a fetch issued on `today`.
    pub fn run_cycle(&self, today: NaiveDate) -> CycleOutcome {
        let fetched = self.fetch_and_store(today);
        self.reconcile(fetched, today)
    }

    /// Fetch current totals and persist them as yesterday's snapshot.
    ///
    /// Nothing is retried: a failed fetch leaves the store untouched and a
    /// failed write keeps the snapshot in memory for this cycle only.
    pub fn fetch_and_store(&self, today: NaiveDate) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        let namespace_ready = match self.store.ensure_namespace(&self.identity) {
            Ok(()) => true,
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "could not create snapshot directory");
                outcome.errors.push(e);
                false
            }
        };

        let games = match self.source.fetch(&self.identity) {
            Ok(games) => games,
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "fetch failed, serving cached data");
                outcome.errors.push(e);
                return outcome;
            }
        };

        let snapshot = Snapshot::for_fetch(today, games);
        if !namespace_ready {
            // Already reported; a write would only fail the same way
            outcome.unsaved = Some(snapshot);
            return outcome;
        }
        match self.store.write(&self.identity, &snapshot) {
            Ok(path) => {
                info!(
                    identity = %self.identity,
                    date = %snapshot.date,
                    games = snapshot.games.len(),
                    path = %path.display(),
                    "snapshot written"
                );
            }
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "snapshot not persisted");
                outcome.errors.push(e);
                outcome.unsaved = Some(snapshot);
            }
        }

        outcome
    }

    /// Build the report from persisted snapshots plus any unsaved one.
    pub fn reconcile(&self, fetched: FetchOutcome, today: NaiveDate) -> CycleOutcome {
        let (mut snapshots, _) = self.store.load_all(&self.identity);
        if let Some(unsaved) = fetched.unsaved {
            snapshots.retain(|s| s.date != unsaved.date);
            snapshots.push(unsaved);
        }

        CycleOutcome {
            report: self.build_report(&snapshots, today),
            errors: fetched.errors,
        }
    }

    /// Cache-only path: report from whatever is on disk right now.
    pub fn cached_report(&self, today: NaiveDate) -> PlaytimeReport {
        let (snapshots, _) = self.store.load_all(&self.identity);
        self.build_report(&snapshots, today)
    }

    /// Leaderboards for the `days_count` days ending yesterday, newest first.
    pub fn build_report(&self, snapshots: &[Snapshot], today: NaiveDate) -> PlaytimeReport {
        let histories = merge(snapshots, &self.settings.excluded);
        let reconciler = Reconciler::with_policy(&histories, self.settings.first_seen);

        let mut days = Vec::with_capacity(self.settings.days_count);
        let mut date = today - chrono::Duration::days(1);
        for _ in 0..self.settings.days_count {
            let deltas = reconciler.daily_delta(date);
            days.push(Aggregator::rank(
                date,
                deltas,
                &histories,
                self.settings.games_count,
            ));
            date -= chrono::Duration::days(1);
        }

        PlaytimeReport {
            identity: self.identity.clone(),
            generated_at: Utc::now(),
            days,
            stats: Aggregator::stats(&histories),
        }
    }
}
