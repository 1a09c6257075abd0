//! Spotify Web API client
//!
//! - Token: `POST {accounts_url}/api/token` (client-credentials grant, HTTP Basic auth)
//! - Search: `GET {api_url}/search?q=..&type=artist&limit=1`
//! - Top tracks: `GET {api_url}/artists/{id}/top-tracks?market=..`
//!
//! Every call goes through [`retry_transient`] with the configured policy.
//! With the default policy that is exactly one attempt. Only status and
//! transport failures are retried; a body that does not decode into the
//! expected shape is `EtlError::MalformedRecord`.

use super::CatalogApi;
use crate::error::{EtlError, EtlResult};
use crate::models::{ArtistLookup, ArtistRef, Credential, RawTrack};
use crate::retry::{retry_transient, CallFailure};
use async_trait::async_trait;
use popsongs_common::config::{CatalogSettings, ClientCredentials, RetryPolicy};
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("popsongs-etl/", env!("CARGO_PKG_VERSION"));

/// Error bodies are cut to this many characters before landing in messages
const MAX_ERROR_BODY_CHARS: usize = 200;

pub struct SpotifyClient {
    http_client: Client,
    accounts_url: String,
    api_url: String,
    retry: RetryPolicy,
}

impl SpotifyClient {
    pub fn new(settings: &CatalogSettings, retry: RetryPolicy) -> EtlResult<Self> {
        let http_client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| {
                popsongs_common::Error::Config(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            accounts_url: settings.accounts_url.trim_end_matches('/').to_string(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn call<F>(&self, operation: &str, build: F) -> Result<String, CallFailure>
    where
        F: Fn() -> RequestBuilder,
    {
        retry_transient(operation, &self.retry, || attempt(build())).await
    }
}

/// Send one request and return the body of a success response
async fn attempt(request: RequestBuilder) -> Result<String, CallFailure> {
    let response = request.send().await.map_err(transport_failure)?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        return Err(CallFailure::from_status(status.as_u16(), body.trim(), retry_after));
    }

    response.text().await.map_err(transport_failure)
}

/// Decode a success body; `context` names the call in the error
fn decode<T: DeserializeOwned>(context: &str, body: &str) -> EtlResult<T> {
    serde_json::from_str(body)
        .map_err(|e| EtlError::MalformedRecord(format!("{}: {}", context, e)))
}

fn transport_failure(err: reqwest::Error) -> CallFailure {
    if err.is_builder() || err.is_decode() {
        CallFailure::permanent(format!("Request failed: {}", err))
    } else {
        CallFailure::transient(format!("Request failed: {}", err))
    }
}

#[async_trait]
impl CatalogApi for SpotifyClient {
    async fn authenticate(&self, credentials: &ClientCredentials) -> EtlResult<Credential> {
        let url = format!("{}/api/token", self.accounts_url);
        debug!(url = %url, "Requesting client-credentials token");

        let body = self
            .call("authenticate", || {
                self.http_client
                    .post(&url)
                    .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
                    .form(&[("grant_type", "client_credentials")])
            })
            .await
            .map_err(|f| EtlError::Auth(f.message))?;
        let token: TokenResponse = decode("token response", &body)?;

        if token.access_token.trim().is_empty() {
            return Err(EtlError::Auth("token endpoint returned an empty access_token".to_string()));
        }

        debug!(
            token_type = token.token_type.as_deref().unwrap_or("unknown"),
            expires_in = token.expires_in.unwrap_or_default(),
            "Token acquired"
        );
        Ok(Credential::new(token.access_token))
    }

    async fn resolve_artist(&self, credential: &Credential, name: &str) -> EtlResult<ArtistLookup> {
        let url = format!("{}/search", self.api_url);

        let body = self
            .call("resolve_artist", || {
                self.http_client
                    .get(&url)
                    .bearer_auth(credential.token())
                    .query(&[("q", name), ("type", "artist"), ("limit", "1")])
            })
            .await
            .map_err(|f| EtlError::Lookup {
                artist: name.to_string(),
                message: f.message,
            })?;
        let result: SearchResponse = decode(&format!("search response for '{}'", name), &body)?;

        match result.artists.items.into_iter().next() {
            Some(hit) => {
                debug!(query = %name, matched = %hit.name, id = %hit.id, "Artist resolved");
                Ok(ArtistLookup::Found(ArtistRef {
                    name: name.to_string(),
                    id: hit.id,
                }))
            }
            None => Ok(ArtistLookup::NotFound),
        }
    }

    async fn top_tracks(
        &self,
        credential: &Credential,
        artist_id: &str,
        market: &str,
    ) -> EtlResult<Vec<RawTrack>> {
        let url = format!("{}/artists/{}/top-tracks", self.api_url, artist_id);

        let body = self
            .call("top_tracks", || {
                self.http_client
                    .get(&url)
                    .bearer_auth(credential.token())
                    .query(&[("market", market)])
            })
            .await
            .map_err(|f| EtlError::Fetch {
                artist_id: artist_id.to_string(),
                market: market.to_string(),
                message: f.message,
            })?;
        let result: TopTracksResponse = decode(
            &format!("top tracks for artist {} in market {}", artist_id, market),
            &body,
        )?;

        debug!(artist_id, market, tracks = result.tracks.len(), "Top tracks fetched");
        Ok(result.tracks)
    }
}

// ============================================================================
// Spotify API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    artists: SearchArtists,
}

#[derive(Debug, Deserialize)]
struct SearchArtists {
    #[serde(default)]
    items: Vec<SearchArtist>,
}

#[derive(Debug, Deserialize)]
struct SearchArtist {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    tracks: Vec<RawTrack>,
}
