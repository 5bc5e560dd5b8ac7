//! Services for fetching, persisting and reconciling playtime

pub mod aggregator;
pub mod delivery;
pub mod fetcher;
pub mod merger;
pub mod reconciler;
pub mod scheduler;
pub mod store;
pub mod tracker;

pub use aggregator::Aggregator;
pub use delivery::{JsonLinesSink, ReportSink};
pub use fetcher::{SnapshotSource, SteamClient};
pub use merger::merge;
pub use reconciler::{compute_daily_delta, horizon, FirstSeenPolicy, Reconciler};
pub use scheduler::{next_trigger, IdentityWorker, Scheduler, WorkerState};
pub use store::SnapshotStore;
pub use tracker::{CycleOutcome, FetchOutcome, PlaytimeTracker, ReportSettings};
