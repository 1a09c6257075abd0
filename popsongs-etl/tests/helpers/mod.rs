//! Test Helper Utilities
//!
//! - `FakeSpotify`: a local axum server answering the three catalog endpoints
//! - `MemorySink`: a `SongSink` that keeps appended rows in memory

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use popsongs_common::config::{
    CatalogSettings, ClientCredentials, MissingArtistPolicy, PipelineConfig, RetryPolicy,
};
use popsongs_etl::catalog::SpotifyClient;
use popsongs_etl::load::SongSink;
use popsongs_etl::models::PopularSongRow;
use popsongs_etl::EtlResult;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_TOKEN: &str = "test-token";

/// In-process stand-in for the Spotify accounts service and Web API
pub struct FakeSpotify {
    /// Artist name → catalog id
    pub artists: HashMap<String, String>,
    pub tracks_per_batch: usize,
    /// Status returned by the token endpoint instead of a token
    pub token_status: Option<StatusCode>,
    /// Top-tracks requests answered with 503 before serving normally
    pub top_tracks_failures: AtomicUsize,
    /// Top-tracks requests answered with 429 and `Retry-After: 30`
    pub top_tracks_rate_limited: AtomicUsize,
    /// Raw 200 body returned by every top-tracks request, if set
    pub top_tracks_body: Option<String>,
    /// Status returned by every top-tracks request, if set
    pub top_tracks_status: Option<StatusCode>,
    /// Repeat the first track of every batch in place of the second
    pub duplicate_first_track: bool,
    /// Artist id whose tracks come back without an album
    pub omit_album_for: Option<String>,
    /// `METHOD path?query` of every request received
    pub requests: Mutex<Vec<String>>,
    /// Authorization header values seen on the token endpoint
    pub token_auth: Mutex<Vec<String>>,
}

impl FakeSpotify {
    pub fn new(artists: &[(&str, &str)]) -> Self {
        Self {
            artists: artists
                .iter()
                .map(|(name, id)| (name.to_string(), id.to_string()))
                .collect(),
            tracks_per_batch: 10,
            token_status: None,
            top_tracks_failures: AtomicUsize::new(0),
            top_tracks_rate_limited: AtomicUsize::new(0),
            top_tracks_body: None,
            top_tracks_status: None,
            duplicate_first_track: false,
            omit_album_for: None,
            requests: Mutex::new(Vec::new()),
            token_auth: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_requests(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }

    fn log(&self, entry: String) {
        self.requests.lock().unwrap().push(entry);
    }
}

/// Start the fake on an ephemeral port; returns its base URL
pub async fn spawn(fake: Arc<FakeSpotify>) -> String {
    let app = Router::new()
        .route("/api/token", post(token))
        .route("/v1/search", get(search))
        .route("/v1/artists/:id/top-tracks", get(top_tracks))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake catalog");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}", addr)
}

pub fn catalog_settings(base_url: &str) -> CatalogSettings {
    CatalogSettings {
        accounts_url: base_url.to_string(),
        api_url: format!("{}/v1", base_url),
        request_timeout_secs: 5,
    }
}

pub fn client(base_url: &str, retry: RetryPolicy) -> SpotifyClient {
    SpotifyClient::new(&catalog_settings(base_url), retry).expect("Failed to build client")
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
    }
}

pub fn credentials() -> ClientCredentials {
    ClientCredentials {
        client_id: "client".to_string(),
        client_secret: "secret".to_string(),
    }
}

pub fn pipeline(artists: &[&str], markets: &[&str]) -> PipelineConfig {
    PipelineConfig {
        artists: artists.iter().map(|s| s.to_string()).collect(),
        markets: markets.iter().map(|s| s.to_string()).collect(),
        tracks_per_artist_per_market: 10,
        on_missing_artist: MissingArtistPolicy::Fail,
    }
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", TEST_TOKEN))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"status": 401, "message": "Invalid access token"}})),
    )
        .into_response()
}

async fn token(
    State(fake): State<Arc<FakeSpotify>>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    fake.log("POST /api/token".to_string());
    if let Some(auth) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        fake.token_auth.lock().unwrap().push(auth.to_string());
    }

    if let Some(status) = fake.token_status {
        return (status, Json(json!({"error": "invalid_client"}))).into_response();
    }
    if form.get("grant_type").map(String::as_str) != Some("client_credentials") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        )
            .into_response();
    }

    Json(json!({
        "access_token": TEST_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600
    }))
    .into_response()
}

async fn search(
    State(fake): State<Arc<FakeSpotify>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let q = params.get("q").cloned().unwrap_or_default();
    fake.log(format!(
        "GET /v1/search?q={}&type={}&limit={}",
        q,
        params.get("type").cloned().unwrap_or_default(),
        params.get("limit").cloned().unwrap_or_default()
    ));
    if !bearer_ok(&headers) {
        return unauthorized();
    }

    let items: Vec<Value> = fake
        .artists
        .get(&q)
        .map(|id| vec![json!({"id": id, "name": q, "type": "artist"})])
        .unwrap_or_default();

    Json(json!({"artists": {"items": items, "total": items.len()}})).into_response()
}

async fn top_tracks(
    State(fake): State<Arc<FakeSpotify>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let market = params.get("market").cloned().unwrap_or_default();
    fake.log(format!("GET /v1/artists/{}/top-tracks?market={}", id, market));
    if !bearer_ok(&headers) {
        return unauthorized();
    }

    if let Some(status) = fake.top_tracks_status {
        return (status, "upstream says no").into_response();
    }
    let limited = fake.top_tracks_rate_limited.load(Ordering::SeqCst);
    if limited > 0 {
        fake.top_tracks_rate_limited.store(limited - 1, Ordering::SeqCst);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, "30")],
            "slow down",
        )
            .into_response();
    }
    if let Some(body) = &fake.top_tracks_body {
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body.clone(),
        )
            .into_response();
    }
    let pending = fake.top_tracks_failures.load(Ordering::SeqCst);
    if pending > 0 {
        fake.top_tracks_failures.store(pending - 1, Ordering::SeqCst);
        return (StatusCode::SERVICE_UNAVAILABLE, "try later").into_response();
    }

    let artist_name = fake
        .artists
        .iter()
        .find(|(_, artist_id)| **artist_id == id)
        .map(|(name, _)| name.clone())
        .unwrap_or_default();

    let mut tracks: Vec<Value> = (0..fake.tracks_per_batch)
        .map(|n| {
            let track_id = format!("{}-{}", id, n);
            let mut track = json!({
                "id": track_id,
                "name": format!("{} song {}", artist_name, n),
                "artists": [{"id": id, "name": artist_name}],
                "album": {"name": format!("{} greatest hits", artist_name)},
                "popularity": 90 - n as i64,
                "duration_ms": 180_000 + n as i64 * 1000,
                "explicit": false,
                "external_urls": {"spotify": format!("https://open.spotify.com/track/{}", track_id)}
            });
            if fake.omit_album_for.as_deref() == Some(id.as_str()) {
                track.as_object_mut().unwrap().remove("album");
            }
            track
        })
        .collect();

    if fake.duplicate_first_track && tracks.len() > 1 {
        tracks[1] = tracks[0].clone();
    }

    Json(json!({"tracks": tracks})).into_response()
}

/// Sink that records every append
#[derive(Default)]
pub struct MemorySink {
    pub appends: Mutex<Vec<(String, Vec<PopularSongRow>)>>,
}

impl MemorySink {
    pub fn appends(&self) -> Vec<(String, Vec<PopularSongRow>)> {
        self.appends.lock().unwrap().clone()
    }
}

#[async_trait]
impl SongSink for MemorySink {
    async fn append(&self, table: &str, rows: &[PopularSongRow]) -> EtlResult<u64> {
        self.appends
            .lock()
            .unwrap()
            .push((table.to_string(), rows.to_vec()));
        Ok(rows.len() as u64)
    }
}
