//! Music catalog access
//!
//! [`CatalogApi`] is the seam between the extractor and the network. The
//! production implementation is [`SpotifyClient`]; tests drive the extractor
//! with in-memory implementations.

pub mod spotify;

pub use spotify::SpotifyClient;

use crate::error::EtlResult;
use crate::models::{ArtistLookup, Credential, RawTrack};
use async_trait::async_trait;
use popsongs_common::config::ClientCredentials;

/// Request/response operations against a music catalog
///
/// Implementations hold no state across calls beyond transport configuration;
/// the credential is passed explicitly to every call.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Exchange client credentials for a bearer token
    ///
    /// # Errors
    /// `EtlError::Auth` on any non-success response or transport failure.
    async fn authenticate(&self, credentials: &ClientCredentials) -> EtlResult<Credential>;

    /// Look up the best-matching artist for `name`
    ///
    /// Zero matches is `ArtistLookup::NotFound`, not an error.
    ///
    /// # Errors
    /// `EtlError::Lookup` on any non-success response or transport failure.
    async fn resolve_artist(&self, credential: &Credential, name: &str) -> EtlResult<ArtistLookup>;

    /// Fetch an artist's top tracks for one market
    ///
    /// # Errors
    /// `EtlError::Fetch` on any non-success response or transport failure.
    async fn top_tracks(
        &self,
        credential: &Credential,
        artist_id: &str,
        market: &str,
    ) -> EtlResult<Vec<RawTrack>>;
}
