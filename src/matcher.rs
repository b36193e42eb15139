//! Decides which activities count toward which targets.
//!
//! Two kinds of target are supported and may be mixed in one configuration:
//!
//! - **Point** (geofence): an activity counts once if any GPS sample lies
//!   within the radius. No time is recorded.
//! - **Segment**: every effort on the segment counts, with its elapsed time.
//!   Two efforts in one activity are two laps.
//!
//! Absent tracks or efforts never match and never error.

use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{bounds_overlap, compute_bounds, radius_bounds, within_radius};
use crate::models::{Activity, SegmentEffort};
use crate::{Bounds, GpsPoint};

/// What a target matches against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKind {
    /// Geofence around a point; `center` is `[lat, lng]`
    Point { center: GpsPoint, radius_meters: f64 },
    /// Platform segment id
    Segment { segment_id: u64 },
}

/// A statically configured leaderboard target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: TargetKind,
}

/// One qualifying traversal. Point hits carry no time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lap {
    pub elapsed_time: Option<u32>,
}

impl Target {
    pub fn point(id: &str, name: &str, center: GpsPoint, radius_meters: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: TargetKind::Point { center, radius_meters },
        }
    }

    pub fn segment(id: &str, name: &str, segment_id: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: TargetKind::Segment { segment_id },
        }
    }

    pub fn is_segment(&self) -> bool {
        matches!(self.kind, TargetKind::Segment { .. })
    }

    /// Laps this activity contributes to the target.
    pub fn laps(&self, activity: &Activity) -> Vec<Lap> {
        match &self.kind {
            TargetKind::Point { center, radius_meters } => {
                let hit = activity
                    .latlng
                    .as_deref()
                    .map_or(false, |track| track_hits_point(track, center, *radius_meters));
                if hit {
                    vec![Lap { elapsed_time: None }]
                } else {
                    Vec::new()
                }
            }
            TargetKind::Segment { segment_id } => {
                matching_efforts(activity.segment_efforts.as_deref(), *segment_id)
                    .map(|e| Lap { elapsed_time: Some(e.elapsed_time) })
                    .collect()
            }
        }
    }

    /// True if the activity contributes at least one lap.
    pub fn matches(&self, activity: &Activity) -> bool {
        !self.laps(activity).is_empty()
    }
}

/// True if any sample of `track` lies within `radius_meters` of `center`.
///
/// Stops at the first hit, so an activity that loops past the point several
/// times still counts once.
pub fn track_hits_point(track: &[GpsPoint], center: &GpsPoint, radius_meters: f64) -> bool {
    let Some(track_bounds) = compute_bounds(track) else {
        return false;
    };
    // Fences without a box (polar, antimeridian) skip the pre-filter
    if let Some(fence) = radius_bounds(center, radius_meters) {
        if !bounds_overlap(&track_bounds, &fence, 0.0, center.latitude) {
            return false;
        }
    }

    track
        .iter()
        .filter(|p| p.is_valid())
        .any(|p| within_radius(center, p, radius_meters))
}

/// Efforts on `segment_id`, in recorded order.
pub fn matching_efforts(
    efforts: Option<&[SegmentEffort]>,
    segment_id: u64,
) -> impl Iterator<Item = &SegmentEffort> {
    efforts
        .unwrap_or_default()
        .iter()
        .filter(move |e| e.segment_id() == Some(segment_id))
}

// =============================================================================
// Multi-target matching
// =============================================================================

/// Envelope of one geofence, for R-tree lookup.
#[derive(Debug, Clone)]
struct FenceEnvelope {
    target_idx: usize,
    bounds: Bounds,
}

impl RTreeObject for FenceEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lng, self.bounds.min_lat],
            [self.bounds.max_lng, self.bounds.max_lat],
        )
    }
}

/// Matches one activity against a whole target list.
///
/// Geofences go into an R-tree so each GPS sample is only distance-checked
/// against fences whose envelope contains it. Fences that have no envelope
/// (touching a pole or the ±180° meridian) are checked against every sample.
pub struct TargetMatcher<'a> {
    targets: &'a [Target],
    fences: RTree<FenceEnvelope>,
    unbounded: Vec<usize>,
}

impl<'a> TargetMatcher<'a> {
    pub fn new(targets: &'a [Target]) -> Self {
        let mut envelopes = Vec::new();
        let mut unbounded = Vec::new();

        for (target_idx, target) in targets.iter().enumerate() {
            if let TargetKind::Point { center, radius_meters } = &target.kind {
                match radius_bounds(center, *radius_meters) {
                    Some(bounds) => envelopes.push(FenceEnvelope { target_idx, bounds }),
                    None => unbounded.push(target_idx),
                }
            }
        }

        Self {
            targets,
            fences: RTree::bulk_load(envelopes),
            unbounded,
        }
    }

    pub fn targets(&self) -> &'a [Target] {
        self.targets
    }

    /// Laps per target for one activity, as `(target index, lap)` pairs in
    /// target order.
    pub fn laps(&self, activity: &Activity) -> Vec<(usize, Lap)> {
        let mut fence_hits = vec![false; self.targets.len()];
        if let Some(track) = activity.latlng.as_deref() {
            self.mark_fence_hits(track, &mut fence_hits);
        }

        let mut laps = Vec::new();
        for (idx, target) in self.targets.iter().enumerate() {
            match &target.kind {
                TargetKind::Point { .. } => {
                    if fence_hits[idx] {
                        laps.push((idx, Lap { elapsed_time: None }));
                    }
                }
                TargetKind::Segment { segment_id } => {
                    laps.extend(
                        matching_efforts(activity.segment_efforts.as_deref(), *segment_id)
                            .map(|e| (idx, Lap { elapsed_time: Some(e.elapsed_time) })),
                    );
                }
            }
        }
        laps
    }

    fn mark_fence_hits(&self, track: &[GpsPoint], hits: &mut [bool]) {
        let mut remaining = self.fences.size() + self.unbounded.len();
        if remaining == 0 {
            return;
        }

        for p in track.iter().filter(|p| p.is_valid()) {
            let probe = AABB::from_point([p.longitude, p.latitude]);
            let candidates = self
                .fences
                .locate_in_envelope_intersecting(&probe)
                .map(|fence| fence.target_idx)
                .chain(self.unbounded.iter().copied());

            for idx in candidates {
                if hits[idx] {
                    continue;
                }
                if let TargetKind::Point { center, radius_meters } = &self.targets[idx].kind {
                    if within_radius(center, p, *radius_meters) {
                        hits[idx] = true;
                        remaining -= 1;
                    }
                }
            }
            if remaining == 0 {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SegmentRef;
    use geo::{Destination, Haversine, Point};

    const SUMMIT: GpsPoint = GpsPoint { latitude: 39.1822403, longitude: -106.8761047 };

    fn offset(origin: &GpsPoint, bearing: f64, meters: f64) -> GpsPoint {
        let p = Haversine::destination(Point::new(origin.longitude, origin.latitude), bearing, meters);
        GpsPoint::new(p.y(), p.x())
    }

    fn effort(segment_id: u64, elapsed_time: u32) -> SegmentEffort {
        SegmentEffort {
            segment: Some(SegmentRef { id: segment_id, name: None }),
            elapsed_time,
            ..Default::default()
        }
    }

    fn with_track(track: Vec<GpsPoint>) -> Activity {
        Activity { id: 1, latlng: Some(track), ..Default::default() }
    }

    #[test]
    fn test_point_boundary_is_inclusive() {
        let target = Target::point("summit", "Summit", SUMMIT, 305.0);
        assert!(target.matches(&with_track(vec![offset(&SUMMIT, 90.0, 305.0)])));
        assert!(!target.matches(&with_track(vec![offset(&SUMMIT, 90.0, 306.0)])));
    }

    #[test]
    fn test_point_counts_once_per_activity() {
        let target = Target::point("summit", "Summit", SUMMIT, 305.0);
        let track = vec![SUMMIT, offset(&SUMMIT, 0.0, 2000.0), SUMMIT];
        assert_eq!(target.laps(&with_track(track)).len(), 1);
    }

    #[test]
    fn test_missing_data_never_matches() {
        let point = Target::point("summit", "Summit", SUMMIT, 305.0);
        let segment = Target::segment("climb", "Climb", 4805244);
        let bare = Activity::default();
        assert!(!point.matches(&bare));
        assert!(!segment.matches(&bare));
        assert!(!point.matches(&with_track(Vec::new())));
    }

    #[test]
    fn test_segment_counts_every_effort() {
        let target = Target::segment("climb", "Climb", 4805244);
        let activity = Activity {
            segment_efforts: Some(vec![effort(4805244, 600), effort(1, 10), effort(4805244, 650)]),
            ..Default::default()
        };
        let laps = target.laps(&activity);
        assert_eq!(laps, vec![Lap { elapsed_time: Some(600) }, Lap { elapsed_time: Some(650) }]);
    }

    #[test]
    fn test_target_matcher_mixes_kinds() {
        let far = offset(&SUMMIT, 180.0, 50_000.0);
        let targets = vec![
            Target::point("summit", "Summit", SUMMIT, 305.0),
            Target::segment("climb", "Climb", 4805244),
            Target::point("valley", "Valley", far, 100.0),
        ];
        let matcher = TargetMatcher::new(&targets);

        let activity = Activity {
            latlng: Some(vec![offset(&SUMMIT, 45.0, 100.0), offset(&SUMMIT, 45.0, 120.0)]),
            segment_efforts: Some(vec![effort(4805244, 700)]),
            ..Default::default()
        };

        let laps = matcher.laps(&activity);
        assert_eq!(laps, vec![
            (0, Lap { elapsed_time: None }),
            (1, Lap { elapsed_time: Some(700) }),
        ]);
    }

    #[test]
    fn test_high_latitude_fence_matches() {
        let north = GpsPoint::new(85.0, 20.0);
        let targets = vec![Target::point("north", "North", north, 305.0)];
        let activity = with_track(vec![offset(&north, 90.0, 300.0)]);

        assert!(targets[0].matches(&activity));
        assert_eq!(TargetMatcher::new(&targets).laps(&activity).len(), 1);
    }

    #[test]
    fn test_fence_across_antimeridian_matches() {
        let fence = GpsPoint::new(-17.0, 179.9995);
        let targets = vec![
            Target::point("dateline", "Dateline", fence, 305.0),
            Target::point("summit", "Summit", SUMMIT, 305.0),
        ];
        let activity = with_track(vec![GpsPoint::new(-17.0, -179.9995)]);

        assert!(targets[0].matches(&activity));
        assert_eq!(
            TargetMatcher::new(&targets).laps(&activity),
            vec![(0, Lap { elapsed_time: None })]
        );
    }

    #[test]
    fn test_target_json_shape() {
        let json = r#"[
            {"id": "summit", "name": "Summit", "kind": "point", "center": [39.1822403, -106.8761047], "radius_meters": 305.0},
            {"id": "climb", "name": "Climb", "kind": "segment", "segment_id": 4805244}
        ]"#;
        let targets: Vec<Target> = serde_json::from_str(json).unwrap();
        assert_eq!(targets[0], Target::point("summit", "Summit", SUMMIT, 305.0));
        assert!(targets[1].is_segment());
    }
}
