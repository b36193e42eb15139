//! Process-lifetime leaderboard shared across requests.
//!
//! Each athlete has at most one submission. Re-authenticating replaces the
//! previous submission instead of appending a second one, so the store never
//! double-counts an athlete. The athlete keeps their original position, which
//! is what breaks ties on the shared board.
//!
//! Rows are keyed by athlete id. Two athletes who resolve to the same display
//! name still get a row each.
//!
//! Nothing is persisted; a restart empties the store.

use std::collections::HashMap;

use log::info;
use tokio::sync::RwLock;

use crate::aggregate::{AthleteTally, ScanStats, Tallies};
use crate::matcher::Target;
use crate::rank::{rank_tallies, Leaderboard, RankedBoard};

/// One athlete's aggregated result.
#[derive(Debug, Clone)]
struct Submission {
    athlete_name: String,
    tallies: Tallies,
}

impl Submission {
    /// This athlete's single row on `target_id`, if they have any laps there.
    fn standing(&self, target_id: &str) -> Option<AthleteTally> {
        self.tallies.board(target_id)?.combined(&self.athlete_name)
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    order: Vec<u64>,
    submissions: HashMap<u64, Submission>,
}

/// Shared leaderboard; one writer at a time.
pub struct LeaderboardStore {
    targets: Vec<Target>,
    inner: RwLock<StoreInner>,
}

impl LeaderboardStore {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets,
            inner: RwLock::new(StoreInner::default()),
        }
    }

    /// Store an athlete's tallies. Returns `true` if an earlier submission
    /// from the same athlete was replaced.
    pub async fn submit(&self, athlete_id: u64, athlete_name: &str, tallies: Tallies) -> bool {
        let mut inner = self.inner.write().await;

        let submission = Submission {
            athlete_name: athlete_name.to_string(),
            tallies,
        };

        let replaced = inner.submissions.insert(athlete_id, submission).is_some();
        if !replaced {
            inner.order.push(athlete_id);
        }

        info!(
            "[LeaderboardStore] {} submission from athlete {} ({} athletes total)",
            if replaced { "Replaced" } else { "New" },
            athlete_id,
            inner.order.len()
        );
        replaced
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Rank every submission, one row per athlete per target, ties in
    /// first-submission order.
    pub async fn leaderboard(&self, top_n: usize) -> Leaderboard {
        let inner = self.inner.read().await;
        let submissions: Vec<&Submission> = inner
            .order
            .iter()
            .filter_map(|id| inner.submissions.get(id))
            .collect();

        let mut stats = ScanStats::default();
        for sub in &submissions {
            stats += sub.tallies.stats;
        }

        let boards = self
            .targets
            .iter()
            .map(|target| {
                let standings: Vec<AthleteTally> = submissions
                    .iter()
                    .filter_map(|sub| sub.standing(&target.id))
                    .collect();
                RankedBoard {
                    target: target.clone(),
                    rows: rank_tallies(&standings, top_n),
                }
            })
            .collect();

        Leaderboard { boards, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{TallyBoard, TargetTallies};
    use crate::matcher::Lap;

    fn targets() -> Vec<Target> {
        vec![Target::segment("climb", "Climb", 4805244)]
    }

    fn tallies_for(name: &str, laps: u32) -> Tallies {
        let mut board = TallyBoard::new();
        for i in 0..laps {
            board.record(name, Lap { elapsed_time: Some(600 + i) });
        }
        Tallies {
            targets: vec![TargetTallies { target: targets()[0].clone(), board }],
            ..Default::default()
        }
    }

    fn rows(board: &Leaderboard) -> Vec<(String, u32)> {
        board
            .board("climb")
            .unwrap()
            .rows
            .iter()
            .map(|r| (r.athlete_name.clone(), r.count))
            .collect()
    }

    #[tokio::test]
    async fn test_resubmission_replaces() {
        let store = LeaderboardStore::new(targets());

        assert!(!store.submit(1, "Ana", tallies_for("Ana", 2)).await);
        assert!(store.submit(1, "Ana", tallies_for("Ana", 3)).await);
        assert_eq!(store.len().await, 1);

        assert_eq!(rows(&store.leaderboard(20).await), vec![("Ana".to_string(), 3)]);
    }

    #[tokio::test]
    async fn test_leaderboard_keeps_first_submission_order_on_ties() {
        let store = LeaderboardStore::new(targets());
        store.submit(1, "Ana", tallies_for("Ana", 2)).await;
        store.submit(2, "Ben", tallies_for("Ben", 2)).await;
        store.submit(1, "Ana", tallies_for("Ana", 2)).await;

        let board = store.leaderboard(20).await;
        let names: Vec<&str> = board.board("climb").unwrap().rows.iter().map(|r| r.athlete_name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Ben"]);
    }

    #[tokio::test]
    async fn test_same_name_different_athletes_stay_separate() {
        let store = LeaderboardStore::new(targets());
        store.submit(1, "Jo", tallies_for("Jo", 2)).await;
        store.submit(2, "Jo", tallies_for("Jo", 3)).await;
        store.submit(3, "", tallies_for("", 1)).await;
        store.submit(4, "", tallies_for("", 1)).await;

        assert_eq!(
            rows(&store.leaderboard(20).await),
            vec![
                ("Jo".to_string(), 3),
                ("Jo".to_string(), 2),
                (String::new(), 1),
                (String::new(), 1),
            ]
        );
    }

    #[tokio::test]
    async fn test_row_uses_submitted_name() {
        let store = LeaderboardStore::new(targets());
        // Board labels come from per-activity resolution; the row shows the
        // name the athlete submitted under
        store.submit(7, "Coach", tallies_for("", 2)).await;

        assert_eq!(rows(&store.leaderboard(20).await), vec![("Coach".to_string(), 2)]);
    }

    #[tokio::test]
    async fn test_stats_sum_across_submissions() {
        let store = LeaderboardStore::new(targets());
        let mut a = tallies_for("Ana", 1);
        a.stats.activities_scanned = 4;
        let mut b = tallies_for("Ben", 1);
        b.stats.activities_scanned = 6;
        store.submit(1, "Ana", a).await;
        store.submit(2, "Ben", b).await;

        assert_eq!(store.leaderboard(20).await.stats.activities_scanned, 10);
    }

    #[tokio::test]
    async fn test_empty_store_has_every_target() {
        let store = LeaderboardStore::new(targets());
        assert!(store.is_empty().await);
        let board = store.leaderboard(20).await;
        assert_eq!(board.boards.len(), 1);
        assert!(board.boards[0].rows.is_empty());
    }
}
