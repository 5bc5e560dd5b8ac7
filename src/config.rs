//! TOML configuration
//!
//! ```toml
//! data_dir = "/var/lib/playtrack"   # optional, defaults to ~/.playtrack/data
//!
//! [[identity]]
//! steam_id = "76561197960287930"
//! api_key = "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX"
//! days_count = 5
//! games_count = 5
//! update_time = "00:00"
//! exclude_games = [753]
//! first_seen = "lifetime"
//! ```

use crate::services::{FirstSeenPolicy, SnapshotStore};
use crate::types::{AppId, PlaytrackError, Result};
use chrono::NaiveTime;
use directories::BaseDirs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

pub const DEFAULT_DAYS_COUNT: usize = 5;
pub const DEFAULT_GAMES_COUNT: usize = 5;

static UPDATE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").expect("valid regex"));

/// Wall-clock time of day for the scheduled refresh (`HH:MM`)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UpdateTime(NaiveTime);

impl UpdateTime {
    pub fn time(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for UpdateTime {
    type Err = PlaytrackError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid =
            || PlaytrackError::Config(format!("Invalid update_time '{}', expected HH:MM", s));
        let caps = UPDATE_TIME_RE.captures(s.trim()).ok_or_else(invalid)?;
        let hour: u32 = caps[1].parse().map_err(|_| invalid())?;
        let minute: u32 = caps[2].parse().map_err(|_| invalid())?;
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for UpdateTime {
    type Error = PlaytrackError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UpdateTime> for String {
    fn from(value: UpdateTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for UpdateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

/// Opaque Steam Web API key, never printed
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

fn default_days_count() -> usize {
    DEFAULT_DAYS_COUNT
}

fn default_games_count() -> usize {
    DEFAULT_GAMES_COUNT
}

/// One tracked Steam account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub steam_id: String,
    pub api_key: ApiKey,
    /// Days of history in each report, counting back from yesterday
    #[serde(default = "default_days_count")]
    pub days_count: usize,
    /// Leaderboard size per day
    #[serde(default = "default_games_count")]
    pub games_count: usize,
    #[serde(default)]
    pub update_time: UpdateTime,
    #[serde(default)]
    pub exclude_games: Vec<AppId>,
    #[serde(default)]
    pub first_seen: FirstSeenPolicy,
}

impl IdentityConfig {
    pub fn excluded(&self) -> HashSet<AppId> {
        self.exclude_games.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default, rename = "identity")]
    pub identities: Vec<IdentityConfig>,
}

impl Config {
    /// Default config location (`~/.playtrack/config.toml`)
    pub fn default_path() -> Result<PathBuf> {
        let base_dirs = BaseDirs::new()
            .ok_or_else(|| PlaytrackError::Config("Cannot determine home directory".into()))?;
        Ok(base_dirs.home_dir().join(".playtrack").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PlaytrackError::Config(format!(
                "Config file not found at {}; add at least one [[identity]] with steam_id and api_key",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| PlaytrackError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| PlaytrackError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.identities.is_empty() {
            return Err(PlaytrackError::Config("No [[identity]] configured".into()));
        }

        let mut seen = HashSet::new();
        for identity in &self.identities {
            if identity.steam_id.trim().is_empty() {
                return Err(PlaytrackError::Config("steam_id must not be empty".into()));
            }
            // Used as a directory name under data_dir
            if !identity.steam_id.bytes().all(|b| b.is_ascii_digit()) {
                return Err(PlaytrackError::Config(format!(
                    "steam_id '{}' must be a numeric Steam id",
                    identity.steam_id
                )));
            }
            if identity.api_key.expose().trim().is_empty() {
                return Err(PlaytrackError::Config(format!(
                    "api_key for {} must not be empty",
                    identity.steam_id
                )));
            }
            if identity.days_count == 0 {
                return Err(PlaytrackError::Config(format!(
                    "days_count for {} must be at least 1",
                    identity.steam_id
                )));
            }
            if !seen.insert(identity.steam_id.as_str()) {
                return Err(PlaytrackError::Config(format!(
                    "Duplicate identity {}",
                    identity.steam_id
                )));
            }
        }
        Ok(())
    }

    pub fn identity(&self, steam_id: &str) -> Option<&IdentityConfig> {
        self.identities.iter().find(|i| i.steam_id == steam_id)
    }

    /// Snapshot store rooted at `data_dir`, or the default location
    pub fn store(&self) -> Result<SnapshotStore> {
        match &self.data_dir {
            Some(dir) => Ok(SnapshotStore::with_root(dir.clone())),
            None => SnapshotStore::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        [[identity]]
        steam_id = "76561197960287930"
        api_key = "secret"
    "#;

    // ========== UpdateTime tests ==========

    #[test]
    fn test_update_time_parse() {
        let t: UpdateTime = "07:30".parse().unwrap();
        assert_eq!(t.time(), NaiveTime::from_hms_opt(7, 30, 0).unwrap());
        assert_eq!(t.to_string(), "07:30");
    }

    #[test]
    fn test_update_time_single_digit_hour() {
        let t: UpdateTime = "7:05".parse().unwrap();
        assert_eq!(t.to_string(), "07:05");
    }

    #[test]
    fn test_update_time_invalid() {
        assert!("24:00".parse::<UpdateTime>().is_err());
        assert!("12:60".parse::<UpdateTime>().is_err());
        assert!("noon".parse::<UpdateTime>().is_err());
        assert!("".parse::<UpdateTime>().is_err());
    }

    #[test]
    fn test_update_time_default_midnight() {
        assert_eq!(UpdateTime::default().to_string(), "00:00");
    }

    // ========== Config tests ==========

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.data_dir, None);
        let identity = &config.identities[0];
        assert_eq!(identity.days_count, DEFAULT_DAYS_COUNT);
        assert_eq!(identity.games_count, DEFAULT_GAMES_COUNT);
        assert_eq!(identity.update_time, UpdateTime::default());
        assert!(identity.exclude_games.is_empty());
        assert_eq!(identity.first_seen, FirstSeenPolicy::Lifetime);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_toml_str(
            r#"
            data_dir = "/tmp/playtrack"

            [[identity]]
            steam_id = "1"
            api_key = "k1"
            days_count = 7
            games_count = 3
            update_time = "04:15"
            exclude_games = [753, 730]
            first_seen = "recent_window"

            [[identity]]
            steam_id = "2"
            api_key = "k2"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/playtrack")));
        assert_eq!(config.identities.len(), 2);
        let first = config.identity("1").unwrap();
        assert_eq!(first.days_count, 7);
        assert_eq!(first.games_count, 3);
        assert_eq!(first.update_time.to_string(), "04:15");
        assert!(first.excluded().contains(&730));
        assert_eq!(first.first_seen, FirstSeenPolicy::RecentWindow);
        assert!(config.identity("3").is_none());
    }

    #[test]
    fn test_invalid_update_time_rejected() {
        let err = Config::from_toml_str(
            r#"
            [[identity]]
            steam_id = "1"
            api_key = "k"
            update_time = "25:00"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PlaytrackError::Parse(_)));
    }

    #[test]
    fn test_no_identity_rejected() {
        let err = Config::from_toml_str("").unwrap_err();
        assert!(matches!(err, PlaytrackError::Config(_)));
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let doubled = format!("{}{}", MINIMAL, MINIMAL);
        let err = Config::from_toml_str(&doubled).unwrap_err();
        assert!(err.to_string().contains("Duplicate identity"));
    }

    #[test]
    fn test_path_like_steam_id_rejected() {
        for bad in ["../x", "a/b", "7656119796028793a", ".."] {
            let err = Config::from_toml_str(&format!(
                "[[identity]]\nsteam_id = \"{}\"\napi_key = \"k\"\n",
                bad
            ))
            .unwrap_err();
            assert!(matches!(err, PlaytrackError::Config(_)), "{} accepted", bad);
        }
    }

    #[test]
    fn test_zero_days_rejected() {
        let err = Config::from_toml_str(
            r#"
            [[identity]]
            steam_id = "1"
            api_key = "k"
            days_count = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PlaytrackError::Config(_)));
    }

    #[test]
    fn test_zero_games_allowed() {
        let config = Config::from_toml_str(
            r#"
            [[identity]]
            steam_id = "1"
            api_key = "k"
            games_count = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.identities[0].games_count, 0);
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(&temp.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, PlaytrackError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, MINIMAL).unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.identities[0].steam_id, "76561197960287930");
        assert_eq!(config.identities[0].api_key.expose(), "secret");
    }

    #[test]
    fn test_store_uses_data_dir() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.data_dir = Some(PathBuf::from("/srv/playtrack"));

        let store = config.store().unwrap();

        assert_eq!(store.root(), Path::new("/srv/playtrack"));
    }
}
