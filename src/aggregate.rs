//! Per-athlete lap tallies across a batch of activities.
//!
//! The [`Aggregator`] is an accumulator: every call to
//! [`Aggregator::add_activities`] adds on top of what is already there. It
//! does not remember which activities it has seen, so feeding the same
//! activity twice counts its laps twice. Callers that keep tallies across
//! requests must deduplicate before aggregating (see `store`).

use std::collections::HashMap;
use std::ops::AddAssign;

use log::debug;
use serde::Serialize;

use crate::matcher::{Lap, Target, TargetMatcher};
use crate::models::{resolve_display_name, Activity};

/// Laps and times for one athlete on one target.
///
/// For segment targets `count == times.len()`. Geofence hits carry no time,
/// so point targets only advance `count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AthleteTally {
    pub athlete_name: String,
    pub count: u32,
    /// Elapsed seconds per lap, in encounter order
    pub times: Vec<u32>,
}

impl AthleteTally {
    pub fn new(athlete_name: &str) -> Self {
        Self {
            athlete_name: athlete_name.to_string(),
            ..Default::default()
        }
    }

    pub fn record(&mut self, lap: Lap) {
        self.count += 1;
        if let Some(t) = lap.elapsed_time {
            self.times.push(t);
        }
    }

    fn absorb(&mut self, other: &AthleteTally) {
        self.count += other.count;
        self.times.extend_from_slice(&other.times);
    }
}

/// Tallies for one target, keyed by athlete name, remembering the order in
/// which athletes first appeared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TallyBoard {
    entries: Vec<AthleteTally>,
    index: HashMap<String, usize>,
}

impl TallyBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, athlete_name: &str) -> Option<&AthleteTally> {
        self.index.get(athlete_name).map(|&i| &self.entries[i])
    }

    /// Tallies in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = &AthleteTally> {
        self.entries.iter()
    }

    pub fn record(&mut self, athlete_name: &str, lap: Lap) {
        self.entry_mut(athlete_name).record(lap);
    }

    /// Every tally on this board folded into one, labelled `athlete_name`.
    ///
    /// Used when the whole board belongs to a single athlete. Returns `None`
    /// for an empty board.
    pub fn combined(&self, athlete_name: &str) -> Option<AthleteTally> {
        if self.entries.is_empty() {
            return None;
        }
        let mut total = AthleteTally::new(athlete_name);
        for tally in &self.entries {
            total.absorb(tally);
        }
        Some(total)
    }

    fn entry_mut(&mut self, athlete_name: &str) -> &mut AthleteTally {
        let idx = match self.index.get(athlete_name) {
            Some(&i) => i,
            None => {
                self.entries.push(AthleteTally::new(athlete_name));
                let i = self.entries.len() - 1;
                self.index.insert(athlete_name.to_string(), i);
                i
            }
        };
        &mut self.entries[idx]
    }
}

/// Diagnostic counters for a scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Activities handed to the aggregator
    pub activities_scanned: u32,
    /// Activities carrying at least one segment effort
    pub activities_with_segment_data: u32,
    /// Activities carrying at least one GPS sample
    pub activities_with_track_data: u32,
    /// Activities that produced at least one lap
    pub activities_matched: u32,
    pub laps_counted: u32,
}

impl AddAssign for ScanStats {
    fn add_assign(&mut self, rhs: Self) {
        self.activities_scanned += rhs.activities_scanned;
        self.activities_with_segment_data += rhs.activities_with_segment_data;
        self.activities_with_track_data += rhs.activities_with_track_data;
        self.activities_matched += rhs.activities_matched;
        self.laps_counted += rhs.laps_counted;
    }
}

/// A target together with its board.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetTallies {
    pub target: Target,
    pub board: TallyBoard,
}

/// Result of aggregation: one board per target, in target order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tallies {
    pub targets: Vec<TargetTallies>,
    pub stats: ScanStats,
}

impl Tallies {
    pub fn board(&self, target_id: &str) -> Option<&TallyBoard> {
        self.targets
            .iter()
            .find(|t| t.target.id == target_id)
            .map(|t| &t.board)
    }
}

/// Folds activities into per-target, per-athlete tallies.
pub struct Aggregator {
    targets: Vec<Target>,
    aliases: HashMap<u64, String>,
    boards: Vec<TallyBoard>,
    stats: ScanStats,
}

impl Aggregator {
    pub fn new(targets: Vec<Target>, aliases: HashMap<u64, String>) -> Self {
        let boards = vec![TallyBoard::new(); targets.len()];
        Self {
            targets,
            aliases,
            boards,
            stats: ScanStats::default(),
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn board(&self, target_id: &str) -> Option<&TallyBoard> {
        self.targets
            .iter()
            .position(|t| t.id == target_id)
            .map(|i| &self.boards[i])
    }

    /// Fold a batch into the running tallies.
    ///
    /// Activities without tracks or efforts are counted as scanned and
    /// contribute nothing else.
    pub fn add_activities(&mut self, activities: &[Activity]) {
        let matcher = TargetMatcher::new(&self.targets);

        #[cfg(feature = "parallel")]
        let laps_per_activity: Vec<Vec<(usize, Lap)>> = {
            use rayon::prelude::*;
            activities.par_iter().map(|a| matcher.laps(a)).collect()
        };

        #[cfg(not(feature = "parallel"))]
        let laps_per_activity: Vec<Vec<(usize, Lap)>> =
            activities.iter().map(|a| matcher.laps(a)).collect();

        for (activity, laps) in activities.iter().zip(laps_per_activity) {
            self.stats.activities_scanned += 1;
            if activity.has_segment_data() {
                self.stats.activities_with_segment_data += 1;
            }
            if activity.has_track_data() {
                self.stats.activities_with_track_data += 1;
            }
            if laps.is_empty() {
                continue;
            }

            self.stats.activities_matched += 1;
            self.stats.laps_counted += laps.len() as u32;

            let name = resolve_display_name(&activity.athlete, &self.aliases);
            debug!(
                "[Aggregator] activity {} ({}) -> {} laps",
                activity.id, name, laps.len()
            );
            for (idx, lap) in laps {
                self.boards[idx].record(&name, lap);
            }
        }
    }

    pub fn finish(self) -> Tallies {
        Tallies {
            targets: self
                .targets
                .into_iter()
                .zip(self.boards)
                .map(|(target, board)| TargetTallies { target, board })
                .collect(),
            stats: self.stats,
        }
    }
}

/// One-shot aggregation of a batch.
///
/// # Example
/// ```
/// use std::collections::HashMap;
/// use segment_leaderboard::{aggregate, Activity, Target};
///
/// let targets = vec![Target::segment("climb", "Castle Creek", 4805244)];
/// let tallies = aggregate(&[Activity::default()], &targets, &HashMap::new());
/// assert_eq!(tallies.stats.activities_scanned, 1);
/// assert!(tallies.board("climb").unwrap().is_empty());
/// ```
pub fn aggregate(
    activities: &[Activity],
    targets: &[Target],
    aliases: &HashMap<u64, String>,
) -> Tallies {
    let mut aggregator = Aggregator::new(targets.to_vec(), aliases.clone());
    aggregator.add_activities(activities);
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Athlete, SegmentEffort, SegmentRef};
    use crate::GpsPoint;

    const SEGMENT: u64 = 4805244;

    fn athlete(id: u64, first: &str, last: &str) -> Athlete {
        Athlete {
            id,
            firstname: Some(first.to_string()),
            lastname: Some(last.to_string()),
            ..Default::default()
        }
    }

    fn effort(segment_id: u64, elapsed_time: u32) -> SegmentEffort {
        SegmentEffort {
            segment: Some(SegmentRef { id: segment_id, name: None }),
            elapsed_time,
            ..Default::default()
        }
    }

    fn ride(id: u64, who: Athlete, efforts: Option<Vec<SegmentEffort>>) -> Activity {
        Activity { id, athlete: who, segment_efforts: efforts, ..Default::default() }
    }

    fn targets() -> Vec<Target> {
        vec![Target::segment("climb", "Castle Creek", SEGMENT)]
    }

    #[test]
    fn test_two_efforts_record_two_laps() {
        let activities = vec![ride(1, athlete(1, "Ana", "Lee"), Some(vec![effort(SEGMENT, 600), effort(SEGMENT, 650)]))];
        let tallies = aggregate(&activities, &targets(), &HashMap::new());

        let tally = tallies.board("climb").unwrap().get("Ana Lee").unwrap();
        assert_eq!(tally.count, 2);
        assert_eq!(tally.times, vec![600, 650]);
    }

    #[test]
    fn test_absent_data_contributes_nothing() {
        let activities = vec![
            ride(1, athlete(1, "Ana", "Lee"), None),
            ride(2, athlete(1, "Ana", "Lee"), Some(Vec::new())),
            ride(3, athlete(2, "Ben", "Ode"), Some(vec![effort(1, 30)])),
        ];
        let tallies = aggregate(&activities, &targets(), &HashMap::new());

        assert!(tallies.board("climb").unwrap().is_empty());
        assert_eq!(tallies.stats.activities_scanned, 3);
        assert_eq!(tallies.stats.activities_with_segment_data, 1);
        assert_eq!(tallies.stats.activities_matched, 0);
    }

    #[test]
    fn test_count_matches_times_for_segments() {
        let activities = vec![
            ride(1, athlete(1, "Ana", "Lee"), Some(vec![effort(SEGMENT, 600)])),
            ride(2, athlete(2, "Ben", "Ode"), Some(vec![effort(SEGMENT, 610), effort(SEGMENT, 620), effort(SEGMENT, 630)])),
            ride(3, athlete(1, "Ana", "Lee"), Some(vec![effort(SEGMENT, 590)])),
        ];
        let tallies = aggregate(&activities, &targets(), &HashMap::new());

        for tally in tallies.board("climb").unwrap().iter() {
            assert_eq!(tally.count as usize, tally.times.len());
        }
        assert_eq!(tallies.board("climb").unwrap().get("Ana Lee").unwrap().count, 2);
    }

    #[test]
    fn test_repeated_aggregation_double_counts() {
        let activities = vec![ride(1, athlete(1, "Ana", "Lee"), Some(vec![effort(SEGMENT, 600)]))];
        let mut aggregator = Aggregator::new(targets(), HashMap::new());

        aggregator.add_activities(&activities);
        aggregator.add_activities(&activities);

        let tally = aggregator.board("climb").unwrap().get("Ana Lee").unwrap();
        assert_eq!(tally.count, 2);
        assert_eq!(tally.times, vec![600, 600]);
        assert_eq!(aggregator.stats().activities_scanned, 2);
    }

    #[test]
    fn test_point_hits_record_no_time() {
        let summit = GpsPoint::new(39.1822403, -106.8761047);
        let targets = vec![Target::point("summit", "Summit", summit, 305.0)];
        let activity = Activity {
            id: 9,
            athlete: athlete(1, "Ana", "Lee"),
            latlng: Some(vec![summit]),
            ..Default::default()
        };

        let tallies = aggregate(&[activity], &targets, &HashMap::new());
        let tally = tallies.board("summit").unwrap().get("Ana Lee").unwrap();
        assert_eq!(tally.count, 1);
        assert!(tally.times.is_empty());
    }

    #[test]
    fn test_aliases_and_empty_names_group_tallies() {
        let mut aliases = HashMap::new();
        aliases.insert(5, "The Ghost".to_string());
        let nameless = Athlete { id: 6, ..Default::default() };

        let activities = vec![
            ride(1, athlete(5, "Cam", "Roe"), Some(vec![effort(SEGMENT, 700)])),
            ride(2, nameless.clone(), Some(vec![effort(SEGMENT, 710)])),
            ride(3, nameless, Some(vec![effort(SEGMENT, 720)])),
        ];
        let tallies = aggregate(&activities, &targets(), &aliases);
        let board = tallies.board("climb").unwrap();

        assert_eq!(board.get("The Ghost").unwrap().count, 1);
        assert_eq!(board.get("").unwrap().count, 2);
        let order: Vec<&str> = board.iter().map(|t| t.athlete_name.as_str()).collect();
        assert_eq!(order, vec!["The Ghost", ""]);
    }

    #[test]
    fn test_combined_folds_board_under_one_name() {
        let mut aliases = HashMap::new();
        aliases.insert(1, "Coach".to_string());
        let activities = vec![
            ride(1, athlete(1, "Ana", "Lee"), Some(vec![effort(SEGMENT, 600)])),
            ride(2, athlete(0, "", ""), Some(vec![effort(SEGMENT, 640), effort(SEGMENT, 610)])),
        ];
        let tallies = aggregate(&activities, &targets(), &aliases);
        let board = tallies.board("climb").unwrap();
        assert_eq!(board.len(), 2);

        let total = board.combined("Coach").unwrap();
        assert_eq!(total.athlete_name, "Coach");
        assert_eq!(total.count, 3);
        assert_eq!(total.times, vec![600, 640, 610]);
        assert!(TallyBoard::new().combined("Coach").is_none());
    }
}
