//! Leaderboard web server.
//!
//! | Route | Description |
//! |-------|-------------|
//! | `GET /` | Redirect to the platform's OAuth consent page |
//! | `GET /exchange_token` | OAuth callback: fetch, aggregate, submit, show personal page |
//! | `GET /leaderboard` | Shared leaderboard, all targets |
//! | `GET /leaderboard/:target_id` | Shared leaderboard, one target |
//! | `GET /api/leaderboard` | Shared leaderboard as JSON |

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::aggregate::aggregate;
use crate::config::LeaderboardConfig;
use crate::error::{AuthError, ConfigError, FetchError};
use crate::http::{build_client, OAuthApp, StravaClient};
use crate::matcher::TargetKind;
use crate::models::resolve_display_name;
use crate::rank::{effort_history, Leaderboard};
use crate::render::{render_athlete_page, render_board, render_error_page, render_leaderboard_page};
use crate::store::LeaderboardStore;

// =============================================================================
// Configuration
// =============================================================================

/// Process configuration read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    pub port: u16,
    /// JSON file with targets and limits; defaults apply when unset
    pub leaderboard_config: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = try_load(&lookup, "PORT", 8080)?;
        Ok(Self {
            client_id: required(&lookup, "CLIENT_ID")?,
            client_secret: required(&lookup, "CLIENT_SECRET")?,
            callback_url: lookup("CALLBACK_URL")
                .unwrap_or_else(|| format!("http://localhost:{}/exchange_token", port)),
            port,
            leaderboard_config: lookup("LEADERBOARD_CONFIG").map(PathBuf::from),
        })
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::MissingVar(key))
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidVar {
            key,
            reason: e.to_string(),
        }),
        None => {
            info!("{key} not set, using default");
            Ok(default)
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Unknown target {0}")]
    UnknownTarget(String),

    #[error("Internal error: {0}")]
    Internal(#[from] FetchError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, title) = match self {
            AppError::Auth { .. } => (StatusCode::UNAUTHORIZED, "Authentication failed"),
            AppError::UnknownTarget { .. } => (StatusCode::NOT_FOUND, "Not found"),
            AppError::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong"),
        };

        warn!("[Server] {}: {}", title, self);
        (status, Html(render_error_page(title, &self.to_string()))).into_response()
    }
}

// =============================================================================
// State & handlers
// =============================================================================

pub struct AppState {
    pub config: LeaderboardConfig,
    pub oauth: OAuthApp,
    pub http: Client,
    pub store: LeaderboardStore,
}

impl AppState {
    pub fn new(server: &ServerConfig, config: LeaderboardConfig) -> Result<Arc<Self>, FetchError> {
        let http = build_client(&config.fetch)?;
        let oauth = OAuthApp::new(&server.client_id, &server.client_secret, &server.callback_url);
        let store = LeaderboardStore::new(config.targets.clone());

        Ok(Arc::new(Self { config, oauth, http, store }))
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

async fn authorize_handler(State(state): State<Arc<AppState>>) -> Redirect {
    Redirect::to(&state.oauth.authorize_url())
}

async fn exchange_token_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<Html<String>, AppError> {
    if let Some(error) = params.error {
        return Err(AuthError::Denied(error).into());
    }
    let code = params.code.ok_or(AuthError::MissingCode)?;

    let grant = state.oauth.exchange_code(&state.http, &code).await?;
    let config = &state.config;

    let client = StravaClient::with_client(state.http.clone(), &grant.access_token, config.fetch.clone());
    let activities = client
        .fetch_for_leaderboard(&grant.athlete, config)
        .await
        .map_err(|e| match e {
            FetchError::Status(status @ (401 | 403)) => AuthError::TokenRefused(status),
            other => AuthError::Fetch(other),
        })?;

    let tallies = aggregate(&activities, &config.targets, &config.aliases);
    let personal = Leaderboard::from_tallies(&tallies, config.top_n);
    let athlete_name = resolve_display_name(&grant.athlete, &config.aliases);

    let histories: Vec<(String, Vec<_>)> = config
        .targets
        .iter()
        .filter_map(|t| match t.kind {
            TargetKind::Segment { segment_id } => Some((
                t.name.clone(),
                effort_history(&activities, segment_id, config.history_limit),
            )),
            TargetKind::Point { .. } => None,
        })
        .collect();

    state.store.submit(grant.athlete.id, &athlete_name, tallies).await;

    Ok(Html(render_athlete_page(&athlete_name, &personal, &histories)))
}

async fn leaderboard_handler(State(state): State<Arc<AppState>>) -> Html<String> {
    let leaderboard = state.store.leaderboard(state.config.top_n).await;
    Html(render_leaderboard_page(&leaderboard))
}

async fn target_leaderboard_handler(
    State(state): State<Arc<AppState>>,
    Path(target_id): Path<String>,
) -> Result<Html<String>, AppError> {
    let leaderboard = state.store.leaderboard(state.config.top_n).await;
    let board = leaderboard
        .board(&target_id)
        .ok_or(AppError::UnknownTarget(target_id.clone()))?;
    Ok(Html(render_board(board)))
}

async fn leaderboard_json_handler(State(state): State<Arc<AppState>>) -> Json<Leaderboard> {
    Json(state.store.leaderboard(state.config.top_n).await)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(authorize_handler))
        .route("/exchange_token", get(exchange_token_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .route("/leaderboard/:target_id", get(target_leaderboard_handler))
        .route("/api/leaderboard", get(leaderboard_json_handler))
        .with_state(state)
}

/// Bind and serve until Ctrl+C / SIGTERM.
pub async fn serve(server: ServerConfig, config: LeaderboardConfig) -> std::io::Result<()> {
    let state = AppState::new(&server, config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let app = router(state);

    let address = format!("0.0.0.0:{}", server.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
