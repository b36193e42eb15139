//! HTTP client for the Strava v3 API.
//!
//! This module provides the activity source behind the leaderboard:
//! - OAuth authorization URL and code-for-token exchange
//! - Paginated activity listing with a hard page ceiling
//! - Per-activity detail (segment efforts) and `latlng` stream fetches
//! - Explicit request timeout and bounded retry with exponential backoff
//!
//! A failed page ends pagination; a failed detail fetch leaves that activity
//! without detail. Neither is surfaced as an error to the caller.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use log::{debug, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::{FetchConfig, LeaderboardConfig};
use crate::error::{AuthError, FetchError};
use crate::models::{Activity, Athlete, StreamSet};
use crate::GpsPoint;

pub const API_BASE: &str = "https://www.strava.com/api/v3";
pub const OAUTH_BASE: &str = "https://www.strava.com/oauth";

const OAUTH_SCOPE: &str = "activity:read_all";

// =============================================================================
// OAuth
// =============================================================================

/// Registered API application credentials.
#[derive(Debug, Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    oauth_base: String,
}

/// Result of a successful code exchange.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_at: Option<i64>,
    pub athlete: Athlete,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_at: Option<i64>,
    #[serde(default)]
    athlete: Athlete,
}

impl OAuthApp {
    pub fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            oauth_base: OAUTH_BASE.to_string(),
        }
    }

    /// Point the OAuth endpoints somewhere else (proxies, local stubs).
    pub fn with_oauth_base(mut self, base: &str) -> Self {
        self.oauth_base = base.trim_end_matches('/').to_string();
        self
    }

    /// URL the athlete is redirected to for consent.
    pub fn authorize_url(&self) -> String {
        let base = format!("{}/authorize", self.oauth_base);
        let params = [
            ("client_id", self.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("approval_prompt", "force"),
            ("scope", OAUTH_SCOPE),
        ];
        match Url::parse_with_params(&base, &params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                warn!("[OAuth] Invalid authorize base {}: {}", base, e);
                base
            }
        }
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, client: &Client, code: &str) -> Result<TokenGrant, AuthError> {
        if code.trim().is_empty() {
            return Err(AuthError::MissingCode);
        }

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];

        let resp = client
            .post(format!("{}/token", self.oauth_base))
            .form(&form)
            .send()
            .await
            .map_err(FetchError::from)?;

        let status = resp.status();
        if !status.is_success() {
            warn!("[OAuth] Token exchange rejected: HTTP {}", status);
            return Err(AuthError::Rejected(status.as_u16()));
        }

        let bytes = resp.bytes().await.map_err(FetchError::from)?;
        let token: TokenResponse = serde_json::from_slice(&bytes).map_err(FetchError::from)?;
        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        info!("[OAuth] Token granted for athlete {}", token.athlete.id);
        Ok(TokenGrant {
            access_token,
            expires_at: token.expires_at,
            athlete: token.athlete,
        })
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Collect pages until one comes back short, one fails, or `max_pages` is hit.
///
/// Pages are 1-based. A failed page truncates the result; items from earlier
/// pages are kept. The exception is a first page refused with 401/403: the
/// token itself is no good, so that error is returned.
pub async fn paginate<T, F, Fut>(per_page: u32, max_pages: u32, mut fetch_page: F) -> Result<Vec<T>, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, FetchError>>,
{
    let mut items = Vec::new();

    for page in 1..=max_pages {
        match fetch_page(page).await {
            Ok(batch) => {
                let n = batch.len();
                items.extend(batch);
                debug!("[Paginate] page {} -> {} items", page, n);
                if n < per_page as usize {
                    return Ok(items);
                }
            }
            Err(e) if page == 1 && e.is_unauthorized() => {
                warn!("[Paginate] first page refused: {}", e);
                return Err(e);
            }
            Err(e) => {
                warn!("[Paginate] page {} failed, stopping with {} items: {}", page, items.len(), e);
                return Ok(items);
            }
        }
    }

    warn!("[Paginate] Hit page ceiling ({}), results may be incomplete", max_pages);
    Ok(items)
}

/// Statuses worth another attempt.
fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

// =============================================================================
// Client
// =============================================================================

/// Authenticated client for one athlete's session.
pub struct StravaClient {
    client: Client,
    auth_header: String,
    api_base: String,
    config: FetchConfig,
}

impl StravaClient {
    pub fn new(access_token: &str, config: FetchConfig) -> Result<Self, FetchError> {
        let client = build_client(&config)?;
        Ok(Self::with_client(client, access_token, config))
    }

    /// Reuse an existing connection pool.
    pub fn with_client(client: Client, access_token: &str, config: FetchConfig) -> Self {
        Self {
            client,
            auth_header: format!("Bearer {}", access_token),
            api_base: API_BASE.to_string(),
            config,
        }
    }

    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// GET a JSON resource, retrying transport errors, 429 and 5xx.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.api_base, path);
        let mut retries = 0;

        loop {
            let req_start = Instant::now();
            let response = self
                .client
                .get(&url)
                .header("Authorization", &self.auth_header)
                .query(query)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if is_retryable(status) {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(FetchError::RetriesExhausted(format!("HTTP {}", status)));
                        }
                        let wait = self.config.backoff(retries);
                        warn!("[Fetch {}] HTTP {} after {:?}, retry {} in {:?}", path, status, req_start.elapsed(), retries, wait);
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(FetchError::Status(status.as_u16()));
                    }

                    let bytes = resp.bytes().await?;
                    debug!("[Fetch {}] {:.1}KB in {:?}", path, bytes.len() as f64 / 1024.0, req_start.elapsed());
                    return Ok(serde_json::from_slice(&bytes)?);
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(FetchError::Transport(e));
                    }
                    let wait = self.config.backoff(retries);
                    warn!("[Fetch {}] Error: {}, retry {} in {:?}", path, e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// One page of the authenticated athlete's activities.
    pub async fn activities_page(&self, page: u32) -> Result<Vec<Activity>, FetchError> {
        let mut query = vec![
            ("per_page", self.config.per_page.to_string()),
            ("page", page.to_string()),
        ];
        if let Some(cutoff) = self.config.cutoff {
            query.push(("after", cutoff.timestamp().to_string()));
        }
        self.get_json("/athlete/activities", &query).await
    }

    /// All activities since the configured cutoff, bounded by `max_pages`.
    ///
    /// Fails only when the first page is refused with 401/403.
    pub async fn list_activities(&self) -> Result<Vec<Activity>, FetchError> {
        paginate(self.config.per_page, self.config.max_pages, |page| self.activities_page(page)).await
    }

    /// Activity detail including every segment effort.
    pub async fn activity_detail(&self, activity_id: u64) -> Result<Activity, FetchError> {
        self.get_json(
            &format!("/activities/{}", activity_id),
            &[("include_all_efforts", "true".to_string())],
        )
        .await
    }

    /// GPS track of an activity. Activities recorded without GPS yield an
    /// empty track.
    pub async fn latlng_stream(&self, activity_id: u64) -> Result<Vec<GpsPoint>, FetchError> {
        let streams: StreamSet = self
            .get_json(
                &format!("/activities/{}/streams", activity_id),
                &[("keys", "latlng".to_string()), ("key_by_type", "true".to_string())],
            )
            .await?;
        Ok(streams.latlng.map(|s| s.data).unwrap_or_default())
    }

    /// Attach efforts and/or tracks to each activity.
    ///
    /// Up to `detail_concurrency` activities are in flight at once; output
    /// keeps input order. A failed fetch leaves that activity as it was.
    pub async fn enrich(&self, activities: Vec<Activity>, want_efforts: bool, want_tracks: bool) -> Vec<Activity> {
        use futures::stream::{self, StreamExt};

        let total = activities.len() as u32;
        let completed = AtomicU32::new(0);
        let failed = AtomicU32::new(0);
        let start = Instant::now();

        let enriched: Vec<Activity> = stream::iter(activities)
            .map(|mut activity| {
                let completed = &completed;
                let failed = &failed;
                async move {
                    if want_efforts {
                        match self.activity_detail(activity.id).await {
                            Ok(detail) => activity.segment_efforts = detail.segment_efforts,
                            Err(e) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                warn!("[StravaClient] Detail for {} unavailable: {}", activity.id, e);
                            }
                        }
                    }
                    if want_tracks {
                        match self.latlng_stream(activity.id).await {
                            Ok(track) => activity.latlng = Some(track),
                            Err(e) => {
                                failed.fetch_add(1, Ordering::Relaxed);
                                warn!("[StravaClient] Stream for {} unavailable: {}", activity.id, e);
                            }
                        }
                    }
                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!("[Progress] {}/{}", done, total);
                    activity
                }
            })
            .buffered(self.config.detail_concurrency.max(1))
            .collect()
            .await;

        info!(
            "[StravaClient] Enriched {} activities in {:.2}s ({} failed fetches)",
            total,
            start.elapsed().as_secs_f64(),
            failed.load(Ordering::Relaxed)
        );
        enriched
    }

    /// Everything the leaderboard needs for the authenticated athlete.
    ///
    /// Activity summaries only carry the athlete id, so `athlete` (from the
    /// token grant) is stamped onto each unnamed one. The endpoint only lists
    /// the authenticated athlete's own activities.
    pub async fn fetch_for_leaderboard(
        &self,
        athlete: &Athlete,
        config: &LeaderboardConfig,
    ) -> Result<Vec<Activity>, FetchError> {
        let mut activities = self.list_activities().await?;
        info!("[StravaClient] Listed {} activities for athlete {}", activities.len(), athlete.id);

        for activity in &mut activities {
            if activity.athlete.is_anonymous() {
                activity.athlete = athlete.clone();
            }
        }

        Ok(self.enrich(activities, config.needs_segment_efforts(), config.needs_tracks()).await)
    }
}

/// Pooled client with the configured timeout.
pub fn build_client(config: &FetchConfig) -> Result<Client, FetchError> {
    Ok(Client::builder()
        .pool_idle_timeout(std::time::Duration::from_secs(60))
        .tcp_keepalive(std::time::Duration::from_secs(30))
        .timeout(config.request_timeout())
        .build()?)
}


/// Client behaviour against a local stand-in for the platform API.
#[cfg(all(test, feature = "server"))]
mod local_api_tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::{
        extract::{Path, State},
        http::{HeaderMap, StatusCode as AxumStatus},
        response::{IntoResponse, Response},
        routing::{get, post},
        Form, Json, Router,
    };
    use serde_json::json;
    use tokio::net::TcpListener;

    const SEGMENT: u64 = 4805244;

    /// Request counters per stubbed activity.
    #[derive(Default)]
    struct Hits {
        flaky: AtomicU32,
        down: AtomicU32,
    }

    async fn detail(State(hits): State<Arc<Hits>>, Path(id): Path<u64>) -> Response {
        match id {
            // Gone
            2 => AxumStatus::NOT_FOUND.into_response(),
            // Fails once, then recovers
            3 if hits.flaky.fetch_add(1, Ordering::SeqCst) == 0 => {
                AxumStatus::INTERNAL_SERVER_ERROR.into_response()
            }
            // Never recovers
            4 => {
                hits.down.fetch_add(1, Ordering::SeqCst);
                AxumStatus::SERVICE_UNAVAILABLE.into_response()
            }
            _ => Json(json!({
                "id": id,
                "segment_efforts": [{"segment": {"id": SEGMENT}, "elapsed_time": 600 + id}]
            }))
            .into_response(),
        }
    }

    async fn activities(headers: HeaderMap) -> Response {
        let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or("");
        if auth == "Bearer revoked" {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        Json(json!([{"id": 1, "athlete": {"id": 11}}, {"id": 2, "athlete": {"id": 11}}])).into_response()
    }

    async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
        match form.get("code").map(String::as_str) {
            Some("good") => Json(json!({
                "access_token": "abc",
                "expires_at": 1_700_000_000,
                "athlete": {"id": 11, "username": "ana"}
            }))
            .into_response(),
            _ => (AxumStatus::BAD_REQUEST, "bad code").into_response(),
        }
    }

    async fn spawn_api() -> (String, Arc<Hits>) {
        let hits = Arc::new(Hits::default());
        let app = Router::new()
            .route("/activities/:id", get(detail))
            .route("/athlete/activities", get(activities))
            .route("/oauth/token", post(token))
            .with_state(hits.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), hits)
    }

    fn fast_config() -> FetchConfig {
        FetchConfig {
            max_retries: 2,
            backoff_base_ms: 1,
            request_timeout_secs: 5,
            ..Default::default()
        }
    }

    fn client(base: &str, token: &str) -> StravaClient {
        StravaClient::new(token, fast_config()).unwrap().with_api_base(base)
    }

    #[tokio::test]
    async fn test_enrich_keeps_order_and_skips_failed_details() {
        let (base, hits) = spawn_api().await;
        let client = client(&base, "abc");

        let input: Vec<Activity> = (1..=5).map(|id| Activity { id, ..Default::default() }).collect();
        let enriched = client.enrich(input, true, false).await;

        let ids: Vec<u64> = enriched.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let times: Vec<Option<u32>> = enriched
            .iter()
            .map(|a| a.segment_efforts.as_ref().map(|e| e[0].elapsed_time))
            .collect();
        assert_eq!(times, vec![Some(601), None, Some(603), None, Some(605)]);

        // 500 then 200
        assert_eq!(hits.flaky.load(Ordering::SeqCst), 2);
        // First attempt plus max_retries
        assert_eq!(hits.down.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_detail_errors() {
        let (base, _) = spawn_api().await;
        let client = client(&base, "abc");

        assert!(matches!(client.activity_detail(2).await, Err(FetchError::Status(404))));
        assert!(matches!(client.activity_detail(4).await, Err(FetchError::RetriesExhausted(_))));
    }

    #[tokio::test]
    async fn test_list_activities_with_refused_token() {
        let (base, _) = spawn_api().await;

        let listed = client(&base, "abc").list_activities().await.unwrap();
        assert_eq!(listed.len(), 2);

        let err = client(&base, "revoked").list_activities().await.unwrap_err();
        assert!(err.is_unauthorized());

        let config = LeaderboardConfig::default();
        let me = Athlete { id: 11, ..Default::default() };
        assert!(client(&base, "revoked").fetch_for_leaderboard(&me, &config).await.is_err());
    }

    #[tokio::test]
    async fn test_exchange_code_success() {
        let (base, _) = spawn_api().await;
        let app = OAuthApp::new("123", "secret", "http://localhost/exchange_token")
            .with_oauth_base(&format!("{}/oauth", base));

        let grant = app.exchange_code(&build_client(&fast_config()).unwrap(), "good").await.unwrap();
        assert_eq!(grant.access_token, "abc");
        assert_eq!(grant.expires_at, Some(1_700_000_000));
        assert_eq!(grant.athlete.id, 11);
        assert_eq!(grant.athlete.username.as_deref(), Some("ana"));
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let (base, _) = spawn_api().await;
        let app = OAuthApp::new("123", "secret", "http://localhost/exchange_token")
            .with_oauth_base(&format!("{}/oauth", base));

        let result = app.exchange_code(&build_client(&fast_config()).unwrap(), "stale").await;
        assert!(matches!(result, Err(AuthError::Rejected(400))));
    }
}
