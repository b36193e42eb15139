//! # Segment Leaderboard
//!
//! Lap counting and ranked leaderboards for Strava activities.
//!
//! This library provides:
//! - Geofence matching (did the activity pass within N meters of a point?)
//! - Segment matching (how many efforts on a given segment?)
//! - Per-athlete tallies with best and average lap times
//! - Stable ranking and `M:SS` formatting
//! - A Strava API client and a small web server (optional)
//!
//! ## Features
//!
//! - **`parallel`** - Match activities in parallel with rayon
//! - **`http`** - Enable the Strava client and the shared leaderboard store
//! - **`server`** - Enable the axum web server and its binary
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::collections::HashMap;
//! use segment_leaderboard::{
//!     aggregate, Activity, Athlete, Leaderboard, SegmentEffort, SegmentRef, Target,
//! };
//!
//! let targets = vec![Target::segment("climb", "Castle Creek", 4805244)];
//!
//! let effort = |secs| SegmentEffort {
//!     segment: Some(SegmentRef { id: 4805244, name: None }),
//!     elapsed_time: secs,
//!     ..Default::default()
//! };
//! let ride = Activity {
//!     id: 1,
//!     athlete: Athlete { id: 7, firstname: Some("Ana".into()), ..Default::default() },
//!     segment_efforts: Some(vec![effort(600), effort(650)]),
//!     ..Default::default()
//! };
//!
//! let tallies = aggregate(&[ride], &targets, &HashMap::new());
//! let leaderboard = Leaderboard::from_tallies(&tallies, 20);
//!
//! let row = &leaderboard.boards[0].rows[0];
//! assert_eq!((row.rank, row.count), (1, 2));
//! assert_eq!(row.best_time_display(), "10:00");
//! ```

use serde::{Deserialize, Serialize};

pub mod aggregate;
pub mod config;
pub mod error;
pub mod geo_utils;
pub mod matcher;
pub mod models;
pub mod rank;
pub mod render;

pub use aggregate::{aggregate, Aggregator, AthleteTally, ScanStats, Tallies, TallyBoard, TargetTallies};
pub use config::{FetchConfig, LeaderboardConfig};
pub use error::{AuthError, ConfigError, FetchError};
pub use matcher::{Lap, Target, TargetKind, TargetMatcher};
pub use models::{resolve_display_name, Activity, Athlete, SegmentEffort, SegmentRef};
pub use rank::{effort_history, format_duration, rank, rank_tallies, EffortHistoryRow, Leaderboard, LeaderboardRow, RankedBoard};

// HTTP module for activity fetching
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{OAuthApp, StravaClient, TokenGrant};

// Shared leaderboard store (uses tokio's RwLock)
#[cfg(feature = "http")]
pub mod store;

#[cfg(feature = "http")]
pub use store::LeaderboardStore;

#[cfg(feature = "server")]
pub mod server;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// Serialized as a `[lat, lng]` pair, the shape of the platform's `latlng`
/// stream.
///
/// # Example
/// ```
/// use segment_leaderboard::GpsPoint;
/// let point = GpsPoint::new(39.1822403, -106.8761047);
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

impl From<[f64; 2]> for GpsPoint {
    fn from([latitude, longitude]: [f64; 2]) -> Self {
        Self { latitude, longitude }
    }
}

impl From<GpsPoint> for [f64; 2] {
    fn from(p: GpsPoint) -> Self {
        [p.latitude, p.longitude]
    }
}

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    pub fn contains(&self, p: &GpsPoint) -> bool {
        p.latitude >= self.min_lat
            && p.latitude <= self.max_lat
            && p.longitude >= self.min_lng
            && p.longitude <= self.max_lng
    }
}

// ============================================================================
// Tests
// ============================================================================
