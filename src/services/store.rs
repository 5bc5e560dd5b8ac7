//! Snapshot store for persistent playtime history
//!
//! Keeps one JSON file per `(identity, date)` under
//! `<root>/<identity>/<YYYY-MM-DD>.json`. The upstream API has no history,
//! so these files are the only record of past totals.

use crate::services::fetcher::RecentlyPlayed;
use crate::types::{PlaytrackError, Result, Snapshot, SnapshotGame, SnapshotWarning};
use chrono::{NaiveDate, Utc};
use directories::BaseDirs;
use fs2::FileExt;
use rayon::prelude::*;
use regex::Regex;
use serde::Deserialize;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

const LOCK_FILE: &str = ".lock";

static SNAPSHOT_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}\.json$").expect("valid regex"));

/// Older record layout: the raw Steam response with a `date` field
/// bolted on.
#[derive(Deserialize)]
struct LegacySnapshot {
    date: String,
    response: RecentlyPlayed,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredSnapshot {
    Current(Snapshot),
    Legacy(LegacySnapshot),
}

pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Create a store under the default data directory (`~/.playtrack/data`)
    pub fn new() -> Result<Self> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| PlaytrackError::Config("Cannot determine home directory".into()))?;
        Ok(Self::with_root(
            base_dirs.home_dir().join(".playtrack").join("data"),
        ))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn namespace_dir(&self, identity: &str) -> PathBuf {
        self.root.join(identity)
    }

    pub fn snapshot_path(&self, identity: &str, date: NaiveDate) -> PathBuf {
        self.namespace_dir(identity)
            .join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Create the identity directory if missing. Safe to call every cycle.
    pub fn ensure_namespace(&self, identity: &str) -> Result<()> {
        let dir = self.namespace_dir(identity);
        fs::create_dir_all(&dir).map_err(|e| {
            PlaytrackError::PersistenceWrite(format!(
                "Could not create directory {}: {}",
                dir.display(),
                e
            ))
        })
    }

    /// Persist a snapshot, replacing any record for the same date.
    ///
    /// The temp file is renamed straight over the target, so a concurrent
    /// reader sees either the old or the new file. Writers for the same
    /// identity are serialized by an exclusive lock on `<identity>/.lock`.
    pub fn write(&self, identity: &str, snapshot: &Snapshot) -> Result<PathBuf> {
        self.ensure_namespace(identity)?;

        let path = self.snapshot_path(identity, snapshot.date);
        let content = serde_json::to_string_pretty(snapshot).map_err(|e| {
            PlaytrackError::PersistenceWrite(format!("Serialization failed: {}", e))
        })?;
        let temp_path = path.with_extension("json.tmp");
        let write_err = |what: &str, e: std::io::Error| {
            PlaytrackError::PersistenceWrite(format!(
                "Could not write file {} ({}): {}",
                path.display(),
                what,
                e
            ))
        };

        // Released on drop if any step below fails
        let lock = self
            .lock_namespace(identity)
            .map_err(|e| write_err("acquire write lock", e))?;

        {
            let mut file = File::create(&temp_path).map_err(|e| write_err("create temp", e))?;
            file.write_all(content.as_bytes())
                .map_err(|e| write_err("write temp", e))?;
            file.sync_all().map_err(|e| write_err("sync temp", e))?;
        }

        if let Err(e) = fs::rename(&temp_path, &path) {
            let _ = fs::remove_file(&temp_path);
            let _ = lock.unlock();
            return Err(write_err("rename", e));
        }

        let _ = lock.unlock();
        debug!(path = %path.display(), "snapshot written");
        Ok(path)
    }

    /// Load every snapshot for `identity`, in no particular order.
    ///
    /// Unreadable or corrupt files are skipped and reported as warnings;
    /// a missing namespace yields no snapshots.
    pub fn load_all(&self, identity: &str) -> (Vec<Snapshot>, Vec<SnapshotWarning>) {
        let files = self.collect_files(identity);

        let results: Vec<std::result::Result<Snapshot, SnapshotWarning>> =
            files.par_iter().map(|f| Self::load_file(f)).collect();

        let mut snapshots = Vec::with_capacity(results.len());
        let mut warnings = Vec::new();
        for result in results {
            match result {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(warning) => {
                    warn!(
                        identity,
                        error = %PlaytrackError::from(warning.clone()),
                        "skipping snapshot file"
                    );
                    warnings.push(warning);
                }
            }
        }

        (snapshots, warnings)
    }

    /// Delete snapshots dated before `cutoff`. Returns the number removed.
    pub fn prune(&self, identity: &str, cutoff: NaiveDate) -> Result<usize> {
        let mut removed = 0;
        for path in self.collect_files(identity) {
            let Some(date) = Self::date_from_path(&path) else {
                continue;
            };
            if date < cutoff {
                fs::remove_file(&path)?;
                debug!(path = %path.display(), "pruned snapshot");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Exclusive lock on the identity's `.lock` file, held across the rename
    fn lock_namespace(&self, identity: &str) -> std::io::Result<File> {
        let lock = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.namespace_dir(identity).join(LOCK_FILE))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    /// Snapshot files named `YYYY-MM-DD.json` in the identity directory
    fn collect_files(&self, identity: &str) -> Vec<PathBuf> {
        let dir = self.namespace_dir(identity);
        if !dir.is_dir() {
            return Vec::new();
        }

        // The data path itself may contain glob metacharacters
        let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).join("*.json");
        let paths = match glob::glob(&pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "invalid snapshot pattern");
                return Vec::new();
            }
        };

        paths
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!(path = %e.path().display(), error = %e.error(), "cannot list snapshot");
                    None
                }
            })
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| SNAPSHOT_FILE_RE.is_match(n))
            })
            .collect()
    }

    fn date_from_path(path: &Path) -> Option<NaiveDate> {
        let stem = path.file_stem()?.to_str()?;
        NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
    }

    fn load_file(path: &Path) -> std::result::Result<Snapshot, SnapshotWarning> {
        let load_err = |e: &dyn std::fmt::Display| {
            format!("Could not load data from {}: {}", path.display(), e)
        };
        let mut content = fs::read_to_string(path)
            .map_err(|e| SnapshotWarning::Unreadable(load_err(&e)))?;

        // SAFETY: `content` is exclusively owned and not aliased; safe for simd_json in-place mutation
        let stored: StoredSnapshot = unsafe { simd_json::from_str(&mut content) }
            .map_err(|e| SnapshotWarning::Corrupted(load_err(&e)))?;

        match stored {
            StoredSnapshot::Current(snapshot) => Ok(snapshot),
            StoredSnapshot::Legacy(legacy) => {
                let date = NaiveDate::parse_from_str(&legacy.date, "%Y-%m-%d").map_err(|e| {
                    SnapshotWarning::Corrupted(format!(
                        "Invalid date '{}' in {}: {}",
                        legacy.date,
                        path.display(),
                        e
                    ))
                })?;
                let fetched_at = fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map(chrono::DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());
                Ok(Snapshot {
                    date,
                    fetched_at,
                    games: legacy
                        .response
                        .games
                        .into_iter()
                        .map(SnapshotGame::from)
                        .collect(),
                })
            }
        }
    }
}
