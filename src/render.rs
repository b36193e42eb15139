//! HTML pages for leaderboards and personal results.
//!
//! Pages are plain server-rendered HTML with no scripts. Every athlete- or
//! platform-supplied string goes through [`escape_html`].

use crate::aggregate::ScanStats;
use crate::rank::{format_duration, EffortHistoryRow, Leaderboard, RankedBoard};

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse;margin-bottom:2em}\
th,td{border:1px solid #ccc;padding:4px 10px;text-align:left}\
th{background:#f4f4f4}";

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title><style>{}</style></head><body>{}</body></html>",
        escape_html(title),
        STYLE,
        body
    )
}

/// Table for one target. Geofence boards have no time columns.
pub fn render_board(board: &RankedBoard) -> String {
    let mut html = String::new();
    html.push_str(&format!("<h2>{}</h2>", escape_html(&board.target.name)));

    if board.rows.is_empty() {
        html.push_str("<p>No laps yet.</p>");
        return html;
    }

    let timed = board.target.is_segment();
    html.push_str("<table><tr><th>Rank</th><th>Athlete</th>");
    html.push_str(if timed { "<th>Laps</th><th>Best</th><th>Average</th>" } else { "<th>Visits</th>" });
    html.push_str("</tr>");

    for row in &board.rows {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td>",
            row.rank,
            escape_html(&row.athlete_name),
            row.count
        ));
        if timed {
            html.push_str(&format!(
                "<td>{}</td><td>{}</td>",
                row.best_time_display(),
                row.avg_time_display().unwrap_or_else(|| "-".to_string())
            ));
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

fn render_stats(stats: &ScanStats) -> String {
    format!(
        "<p><small>{} activities scanned, {} with segment data, {} with GPS tracks, {} laps counted.</small></p>",
        stats.activities_scanned,
        stats.activities_with_segment_data,
        stats.activities_with_track_data,
        stats.laps_counted
    )
}

/// The shared leaderboard across all targets.
pub fn render_leaderboard_page(leaderboard: &Leaderboard) -> String {
    let mut body = String::from("<h1>Leaderboard</h1>");
    for board in &leaderboard.boards {
        body.push_str(&render_board(board));
    }
    body.push_str(&render_stats(&leaderboard.stats));
    page("Leaderboard", &body)
}

/// Landing page after authentication: the athlete's own counts and their
/// effort history on each segment target.
pub fn render_athlete_page(
    athlete_name: &str,
    personal: &Leaderboard,
    histories: &[(String, Vec<EffortHistoryRow>)],
) -> String {
    let name = if athlete_name.is_empty() { "Athlete" } else { athlete_name };
    let mut body = format!("<h1>{}</h1>", escape_html(name));

    if personal.stats.activities_scanned == 0 {
        body.push_str("<p>No activities found.</p>");
    } else {
        for board in &personal.boards {
            let count = board.rows.first().map_or(0, |r| r.count);
            let noun = if board.target.is_segment() { "laps of" } else { "visits near" };
            body.push_str(&format!("<p>{} {} {}.</p>", count, noun, escape_html(&board.target.name)));
        }
    }

    for (target_name, rows) in histories.iter().filter(|(_, rows)| !rows.is_empty()) {
        body.push_str(&format!("<h2>{} history</h2>", escape_html(target_name)));
        body.push_str("<table><tr><th>Date</th><th>Activity</th><th>Time</th><th>PR</th></tr>");
        for row in rows {
            let date = row
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string());
            let pr = match row.pr_rank {
                Some(1) => "PR".to_string(),
                Some(n) => n.to_string(),
                None => String::new(),
            };
            body.push_str(&format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                date,
                escape_html(&row.activity_name),
                format_duration(row.elapsed_time),
                pr
            ));
        }
        body.push_str("</table>");
    }

    body.push_str(&render_stats(&personal.stats));
    body.push_str("<p><a href=\"/leaderboard\">View Leaderboard</a></p>");
    page(name, &body)
}

pub fn render_error_page(title: &str, message: &str) -> String {
    page(
        title,
        &format!(
            "<h1>{}</h1><p>{}</p><p><a href=\"/\">Try again</a></p>",
            escape_html(title),
            escape_html(message)
        ),
    )
}
