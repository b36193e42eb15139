//! Fetch your own activities and print the leaderboard they produce.
//!
//! Run with:
//!   STRAVA_ACCESS_TOKEN=... cargo run --example fetch_and_rank --features http
//!
//! Optionally set LEADERBOARD_CONFIG to a targets JSON file.

use std::time::Instant;

use segment_leaderboard::{aggregate, Athlete, Leaderboard, LeaderboardConfig, StravaClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let token = std::env::var("STRAVA_ACCESS_TOKEN")?;
    let config = match std::env::var("LEADERBOARD_CONFIG") {
        Ok(path) => LeaderboardConfig::load(path)?,
        Err(_) => LeaderboardConfig::default(),
    };

    println!("Fetch and Rank");
    println!("==============");
    println!("Targets: {}", config.targets.len());
    println!("Page size: {}, page ceiling: {}", config.fetch.per_page, config.fetch.max_pages);
    println!();

    let client = StravaClient::new(&token, config.fetch.clone())?;
    let start = Instant::now();

    // Summaries only carry the athlete id; the name comes from the token grant
    // in the server flow, so label everything "me" here.
    let me = Athlete { id: 0, username: Some("me".into()), ..Default::default() };
    let activities = client.fetch_for_leaderboard(&me, &config).await?;
    println!("Fetched {} activities in {:.2}s", activities.len(), start.elapsed().as_secs_f64());

    let tallies = aggregate(&activities, &config.targets, &config.aliases);
    let leaderboard = Leaderboard::from_tallies(&tallies, config.top_n);

    for board in &leaderboard.boards {
        let count = board.rows.first().map_or(0, |r| r.count);
        match board.rows.first().and_then(|r| r.avg_time_display()) {
            Some(avg) => println!("{:<30} {:>4} laps (best {}, avg {})", board.target.name, count, board.rows[0].best_time_display(), avg),
            None => println!("{:<30} {:>4} visits", board.target.name, count),
        }
    }

    Ok(())
}
