//! Leaderboard server.
//!
//! Environment:
//! - `CLIENT_ID`, `CLIENT_SECRET` - API application credentials (required)
//! - `CALLBACK_URL` - OAuth redirect URI (default: `http://localhost:$PORT/exchange_token`)
//! - `PORT` - listen port (default: 8080)
//! - `LEADERBOARD_CONFIG` - JSON file with targets and limits (optional)
//! - `RUST_LOG` - log filter, e.g. `info,segment_leaderboard=debug`

use log::{error, info};
use segment_leaderboard::server::{serve, ServerConfig};
use segment_leaderboard::LeaderboardConfig;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = ServerConfig::from_env().map_err(|e| {
        error!("Environment misconfigured: {e}");
        e
    })?;

    let config = match &server.leaderboard_config {
        Some(path) => LeaderboardConfig::load(path)?,
        None => {
            info!("LEADERBOARD_CONFIG not set, using default targets");
            LeaderboardConfig::default()
        }
    };

    for target in &config.targets {
        info!("Tracking target {} ({})", target.id, target.name);
    }

    serve(server, config).await?;
    info!("Server shut down");
    Ok(())
}
