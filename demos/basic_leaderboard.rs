//! Build a leaderboard from hand-made activities.
//!
//! Run with: cargo run --example basic_leaderboard

use std::collections::HashMap;

use segment_leaderboard::{
    aggregate, format_duration, render::render_leaderboard_page, Activity, Athlete, GpsPoint,
    Leaderboard, SegmentEffort, SegmentRef, Target,
};

const SEGMENT_ID: u64 = 4805244;

fn athlete(id: u64, first: &str, last: &str) -> Athlete {
    Athlete {
        id,
        firstname: Some(first.to_string()),
        lastname: Some(last.to_string()),
        ..Default::default()
    }
}

fn effort(elapsed_time: u32) -> SegmentEffort {
    SegmentEffort {
        segment: Some(SegmentRef { id: SEGMENT_ID, name: Some("Castle Creek".into()) }),
        elapsed_time,
        ..Default::default()
    }
}

fn main() {
    let summit = GpsPoint::new(39.1822403, -106.8761047);
    let targets = vec![
        Target::point("summit", "Summit", summit, 305.0),
        Target::segment("castle-creek", "Castle Creek Climb", SEGMENT_ID),
    ];

    let activities = vec![
        // Two repeats of the climb plus a pass over the summit
        Activity {
            id: 1,
            name: "Hill repeats".into(),
            athlete: athlete(1, "Ana", "Lee"),
            segment_efforts: Some(vec![effort(600), effort(650)]),
            latlng: Some(vec![GpsPoint::new(39.1800, -106.8800), GpsPoint::new(39.1823, -106.8761)]),
            ..Default::default()
        },
        // Rode nearby but never reached the summit
        Activity {
            id: 2,
            name: "Valley spin".into(),
            athlete: athlete(2, "Ben", "Ode"),
            segment_efforts: Some(vec![effort(720)]),
            latlng: Some(vec![GpsPoint::new(39.1500, -106.9000)]),
            ..Default::default()
        },
        // Detail fetch failed: no efforts, no track
        Activity {
            id: 3,
            name: "Commute".into(),
            athlete: athlete(2, "Ben", "Ode"),
            ..Default::default()
        },
    ];

    let tallies = aggregate(&activities, &targets, &HashMap::new());
    let leaderboard = Leaderboard::from_tallies(&tallies, 20);

    println!("Segment Leaderboard Example\n");
    for board in &leaderboard.boards {
        println!("{}", board.target.name);
        println!("{}", "-".repeat(50));
        for row in &board.rows {
            let avg = row.avg_time.map(|a| format_duration(a.round() as u32)).unwrap_or_else(|| "-".into());
            println!(
                "  {:>2}. {:<12} {:>3} laps  best {:>6}  avg {:>6}",
                row.rank, row.athlete_name, row.count, row.best_time_display(), avg
            );
        }
        println!();
    }

    let stats = leaderboard.stats;
    println!(
        "Scanned {} activities ({} with segment data, {} with tracks), {} laps",
        stats.activities_scanned, stats.activities_with_segment_data, stats.activities_with_track_data, stats.laps_counted
    );

    let html = render_leaderboard_page(&leaderboard);
    println!("\nRendered HTML: {} bytes", html.len());
}
