//! Ranking and time formatting.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregate::{AthleteTally, ScanStats, Tallies, TallyBoard};
use crate::matcher::{matching_efforts, Target};
use crate::models::Activity;

/// Default rows shown on a leaderboard.
pub const LEADERBOARD_TOP_N: usize = 20;
/// Default rows shown in a personal effort history.
pub const HISTORY_LIMIT: usize = 50;

/// One ranked leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    /// 1-based position
    pub rank: u32,
    pub athlete_name: String,
    pub count: u32,
    /// Fastest lap in seconds, 0 when no times were recorded
    pub best_time: u32,
    /// Mean lap in seconds, `None` when no times were recorded
    pub avg_time: Option<f64>,
}

impl LeaderboardRow {
    pub fn best_time_display(&self) -> String {
        format_duration(self.best_time)
    }

    pub fn avg_time_display(&self) -> Option<String> {
        self.avg_time.map(|avg| format_duration(avg.round() as u32))
    }
}

/// Ranked rows for one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedBoard {
    pub target: Target,
    pub rows: Vec<LeaderboardRow>,
}

/// Ranked boards for every target, plus scan counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leaderboard {
    pub boards: Vec<RankedBoard>,
    pub stats: ScanStats,
}

impl Leaderboard {
    pub fn from_tallies(tallies: &Tallies, top_n: usize) -> Self {
        Self {
            boards: tallies
                .targets
                .iter()
                .map(|t| RankedBoard {
                    target: t.target.clone(),
                    rows: rank(&t.board, top_n),
                })
                .collect(),
            stats: tallies.stats,
        }
    }

    pub fn board(&self, target_id: &str) -> Option<&RankedBoard> {
        self.boards.iter().find(|b| b.target.id == target_id)
    }
}

/// Rank a board by lap count, highest first.
///
/// The sort is stable, so athletes with equal counts keep the order in which
/// they first appeared. At most `top_n` rows are returned.
///
/// # Example
/// ```
/// use segment_leaderboard::{rank, Lap, TallyBoard};
///
/// let mut board = TallyBoard::new();
/// board.record("Ana", Lap { elapsed_time: Some(600) });
/// board.record("Ana", Lap { elapsed_time: Some(650) });
///
/// let rows = rank(&board, 20);
/// assert_eq!(rows[0].rank, 1);
/// assert_eq!(rows[0].best_time_display(), "10:00");
/// assert_eq!(rows[0].avg_time_display().as_deref(), Some("10:25"));
/// ```
pub fn rank(board: &TallyBoard, top_n: usize) -> Vec<LeaderboardRow> {
    rank_tallies(board.iter(), top_n)
}

/// [`rank`] over any sequence of tallies, in encounter order.
///
/// Rows are not merged by name: two tallies labelled the same stay two rows.
pub fn rank_tallies<'a>(
    tallies: impl IntoIterator<Item = &'a AthleteTally>,
    top_n: usize,
) -> Vec<LeaderboardRow> {
    let mut tallies: Vec<&AthleteTally> = tallies.into_iter().collect();
    tallies.sort_by(|a, b| b.count.cmp(&a.count));

    tallies
        .into_iter()
        .take(top_n)
        .enumerate()
        .map(|(i, tally)| LeaderboardRow {
            rank: i as u32 + 1,
            athlete_name: tally.athlete_name.clone(),
            count: tally.count,
            best_time: tally.times.iter().copied().min().unwrap_or(0),
            avg_time: mean(&tally.times),
        })
        .collect()
}

fn mean(times: &[u32]) -> Option<f64> {
    if times.is_empty() {
        return None;
    }
    let total: u64 = times.iter().map(|&t| t as u64).sum();
    Some(total as f64 / times.len() as f64)
}

/// Render whole seconds as `minutes:seconds`, seconds zero-padded.
///
/// Minutes are not rolled into hours: 3600 seconds is `"60:00"`.
pub fn format_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

// =============================================================================
// Personal history
// =============================================================================

/// One effort in an athlete's history on a segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffortHistoryRow {
    pub activity_id: u64,
    pub activity_name: String,
    pub date: Option<DateTime<Utc>>,
    pub elapsed_time: u32,
    pub pr_rank: Option<u32>,
}

/// Every effort on `segment_id` across `activities`, most recent first.
///
/// Efforts without a date sort last. At most `limit` rows are returned.
pub fn effort_history(activities: &[Activity], segment_id: u64, limit: usize) -> Vec<EffortHistoryRow> {
    let mut rows: Vec<EffortHistoryRow> = activities
        .iter()
        .flat_map(|activity| {
            matching_efforts(activity.segment_efforts.as_deref(), segment_id).map(move |e| {
                EffortHistoryRow {
                    activity_id: activity.id,
                    activity_name: activity.name.clone(),
                    date: e.start_date_local.or(activity.start_date),
                    elapsed_time: e.elapsed_time,
                    pr_rank: e.pr_rank,
                }
            })
        })
        .collect();

    // Stable: same-day efforts stay in recorded order
    rows.sort_by(|a, b| b.date.cmp(&a.date));
    rows.truncate(limit);
    rows
}
