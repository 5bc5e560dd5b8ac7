//! Type definitions for playtrack

mod error;
mod history;
mod report;
mod snapshot;

pub use error::*;
pub use history::*;
pub use report::*;
pub use snapshot::*;

/// Snapshot loading warning types
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotWarning {
    /// Failed to open or read a snapshot file
    Unreadable(String),
    /// Snapshot file was corrupted (invalid JSON or bad date)
    Corrupted(String),
}

impl From<SnapshotWarning> for PlaytrackError {
    fn from(warning: SnapshotWarning) -> Self {
        match warning {
            SnapshotWarning::Unreadable(msg) => PlaytrackError::PersistenceRead(msg),
            SnapshotWarning::Corrupted(msg) => PlaytrackError::Parse(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_into_error() {
        let unreadable = PlaytrackError::from(SnapshotWarning::Unreadable("denied".into()));
        assert!(matches!(unreadable, PlaytrackError::PersistenceRead(_)));

        let corrupted = PlaytrackError::from(SnapshotWarning::Corrupted("eof".into()));
        assert_eq!(corrupted.to_string(), "parse error: eof");
    }
}
