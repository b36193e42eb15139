//! Leaderboard and fetch configuration.
//!
//! Both structs deserialize from JSON with every field optional; anything
//! missing falls back to [`Default`].
//!
//! ```json
//! {
//!   "targets": [
//!     {"id": "summit", "name": "Summit", "kind": "point",
//!      "center": [39.1822403, -106.8761047], "radius_meters": 305.0},
//!     {"id": "climb", "name": "Castle Creek", "kind": "segment", "segment_id": 4805244}
//!   ],
//!   "aliases": {"1234": "Coach"},
//!   "top_n": 20,
//!   "fetch": {"max_pages": 5, "cutoff": "2024-01-01T00:00:00Z"}
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::matcher::Target;
use crate::rank::{HISTORY_LIMIT, LEADERBOARD_TOP_N};
use crate::GpsPoint;

/// Pagination, timeout and retry limits for the activity source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Activities requested per page.
    /// Default: 100 (platform maximum is 200)
    pub per_page: u32,

    /// Hard ceiling on pages fetched per request.
    /// Default: 20
    pub max_pages: u32,

    /// Per-request timeout in seconds.
    /// Default: 30
    pub request_timeout_secs: u64,

    /// Retries after a transport error, 429 or 5xx.
    /// Default: 3
    pub max_retries: u32,

    /// Base backoff in milliseconds, doubled per retry.
    /// Default: 500
    pub backoff_base_ms: u64,

    /// Only activities started after this instant are fetched.
    pub cutoff: Option<DateTime<Utc>>,

    /// Detail/stream requests in flight at once.
    /// Default: 4
    pub detail_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            per_page: 100,
            max_pages: 20,
            request_timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 500,
            cutoff: None,
            detail_concurrency: 4,
        }
    }
}

impl FetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff before retry number `attempt` (1-based), capped at 8x base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms * (1 << attempt.saturating_sub(1).min(3)))
    }
}

/// Targets, naming and presentation limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaderboardConfig {
    pub targets: Vec<Target>,

    /// Display-name overrides keyed by athlete id
    pub aliases: HashMap<u64, String>,

    /// Rows per leaderboard.
    /// Default: 20
    pub top_n: usize,

    /// Rows in a personal effort history.
    /// Default: 50
    pub history_limit: usize,

    pub fetch: FetchConfig,
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            targets: vec![
                Target::point("summit", "Summit", GpsPoint::new(39.1822403, -106.8761047), 305.0),
                Target::segment("castle-creek", "Castle Creek Climb", 4805244),
            ],
            aliases: HashMap::new(),
            top_n: LEADERBOARD_TOP_N,
            history_limit: HISTORY_LIMIT,
            fetch: FetchConfig::default(),
        }
    }
}

impl LeaderboardConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config = Self::from_json(&data)?;
        info!(
            "[Config] Loaded {} targets from {}",
            config.targets.len(),
            path.display()
        );
        Ok(config)
    }

    /// True if any target needs segment efforts (activity detail fetches).
    pub fn needs_segment_efforts(&self) -> bool {
        self.targets.iter().any(Target::is_segment)
    }

    /// True if any target needs GPS tracks (stream fetches).
    pub fn needs_tracks(&self) -> bool {
        self.targets.iter().any(|t| !t.is_segment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_both_target_kinds() {
        let config = LeaderboardConfig::default();
        assert!(config.needs_segment_efforts());
        assert!(config.needs_tracks());
        assert_eq!(config.top_n, 20);
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.fetch.per_page, 100);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let json = r#"{
            "targets": [{"id": "climb", "name": "Climb", "kind": "segment", "segment_id": 4805244}],
            "aliases": {"1234": "Coach"},
            "fetch": {"max_pages": 5, "cutoff": "2024-01-01T00:00:00Z"}
        }"#;
        let config = LeaderboardConfig::from_json(json).unwrap();

        assert_eq!(config.targets.len(), 1);
        assert!(!config.needs_tracks());
        assert_eq!(config.aliases.get(&1234).map(String::as_str), Some("Coach"));
        assert_eq!(config.fetch.max_pages, 5);
        assert_eq!(config.fetch.per_page, 100);
        assert!(config.fetch.cutoff.is_some());
        assert_eq!(config.top_n, 20);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        assert!(matches!(
            LeaderboardConfig::from_json("{\"targets\": 3}"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let fetch = FetchConfig::default();
        assert_eq!(fetch.backoff(1), Duration::from_millis(500));
        assert_eq!(fetch.backoff(2), Duration::from_millis(1000));
        assert_eq!(fetch.backoff(4), Duration::from_millis(4000));
        assert_eq!(fetch.backoff(9), Duration::from_millis(4000));
    }
}
