//! Activity records as delivered by the Strava v3 API.
//!
//! Every field is optional or defaulted. A record missing a name, a segment or
//! a date still deserializes; the matcher simply finds nothing to count.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::GpsPoint;

/// Athlete attached to an activity or returned by the token exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Athlete {
    pub id: u64,
    pub username: Option<String>,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
}

impl Athlete {
    /// True when the record carries no name at all (activity summaries only
    /// embed the athlete id).
    pub fn is_anonymous(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |v| v.trim().is_empty());
        blank(&self.username) && blank(&self.firstname) && blank(&self.lastname)
    }
}

/// Resolve the name an athlete is shown under.
///
/// Precedence:
/// 1. a configured alias for the athlete id
/// 2. the platform username
/// 3. `"firstname lastname"`, trimmed
///
/// When nothing is set the result is an empty string.
pub fn resolve_display_name(athlete: &Athlete, aliases: &HashMap<u64, String>) -> String {
    if let Some(alias) = aliases.get(&athlete.id).filter(|a| !a.trim().is_empty()) {
        return alias.trim().to_string();
    }

    if let Some(username) = athlete.username.as_deref().filter(|u| !u.trim().is_empty()) {
        return username.trim().to_string();
    }

    format!(
        "{} {}",
        athlete.firstname.as_deref().unwrap_or(""),
        athlete.lastname.as_deref().unwrap_or("")
    )
    .trim()
    .to_string()
}

/// Segment reference nested inside an effort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentRef {
    pub id: u64,
    pub name: Option<String>,
}

/// One timed traversal of a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentEffort {
    pub segment: Option<SegmentRef>,
    /// Elapsed time in seconds
    pub elapsed_time: u32,
    /// Rank against the athlete's own history (1 = personal record)
    pub pr_rank: Option<u32>,
    #[serde(deserialize_with = "lenient_datetime")]
    pub start_date_local: Option<DateTime<Utc>>,
}

impl SegmentEffort {
    /// Segment id, or `None` when the record did not carry one.
    pub fn segment_id(&self) -> Option<u64> {
        self.segment.as_ref().map(|s| s.id).filter(|id| *id != 0)
    }
}

/// An activity, optionally enriched with segment efforts or a GPS track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    pub id: u64,
    pub name: String,
    pub athlete: Athlete,
    #[serde(deserialize_with = "lenient_datetime")]
    pub start_date: Option<DateTime<Utc>>,
    /// Present only after a detail fetch
    pub segment_efforts: Option<Vec<SegmentEffort>>,
    /// Present only after a stream fetch
    pub latlng: Option<Vec<GpsPoint>>,
}

impl Activity {
    /// True if a detail fetch attached at least one effort.
    pub fn has_segment_data(&self) -> bool {
        self.segment_efforts.as_ref().map_or(false, |e| !e.is_empty())
    }

    /// True if a stream fetch attached at least one sample.
    pub fn has_track_data(&self) -> bool {
        self.latlng.as_ref().map_or(false, |t| !t.is_empty())
    }
}

/// Stream payload for `keys=latlng&key_by_type=true`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StreamSet {
    pub latlng: Option<LatLngStream>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LatLngStream {
    pub data: Vec<GpsPoint>,
}

/// Malformed or missing timestamps become `None` instead of failing the record.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|d| d.with_timezone(&Utc))
            .ok()
    }))
}
