//! Extraction stage
//!
//! Authenticates once, resolves every configured artist, then fetches top
//! tracks for each (market, artist) pair in market-major order. Each fetch
//! result is wrapped in a [`MarketBatch`] that carries its artist and market.

use crate::catalog::CatalogApi;
use crate::error::{EtlError, EtlResult};
use crate::models::{ArtistLookup, ArtistRef, Credential, MarketBatch};
use popsongs_common::config::{ClientCredentials, MissingArtistPolicy, PipelineConfig};
use tracing::{info, warn};

/// Everything the extraction stage produced
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Resolved artists, in configured order (skipped artists omitted)
    pub artists: Vec<ArtistRef>,
    /// One batch per (market, artist), market-major
    pub batches: Vec<MarketBatch>,
}

pub async fn extract<C>(
    catalog: &C,
    credentials: &ClientCredentials,
    pipeline: &PipelineConfig,
) -> EtlResult<Extraction>
where
    C: CatalogApi + ?Sized,
{
    info!(
        artists = pipeline.artists.len(),
        markets = pipeline.markets.len(),
        "Extracting top tracks from catalog"
    );

    let credential = catalog.authenticate(credentials).await?;

    let artists = resolve_artists(
        catalog,
        &credential,
        &pipeline.artists,
        pipeline.on_missing_artist,
    )
    .await?;

    let mut batches = Vec::with_capacity(artists.len() * pipeline.markets.len());
    for market in &pipeline.markets {
        for artist in &artists {
            let tracks = catalog.top_tracks(&credential, &artist.id, market).await?;
            batches.push(MarketBatch {
                artist: artist.clone(),
                country_code: market.clone(),
                tracks,
            });
        }
    }

    info!(
        resolved = artists.len(),
        batches = batches.len(),
        tracks = batches.iter().map(|b| b.tracks.len()).sum::<usize>(),
        "Extraction complete"
    );

    Ok(Extraction { artists, batches })
}

/// Resolve artist names in order, applying `policy` to names with no match
pub async fn resolve_artists<C>(
    catalog: &C,
    credential: &Credential,
    names: &[String],
    policy: MissingArtistPolicy,
) -> EtlResult<Vec<ArtistRef>>
where
    C: CatalogApi + ?Sized,
{
    let mut resolved = Vec::with_capacity(names.len());

    for name in names {
        match catalog.resolve_artist(credential, name).await? {
            ArtistLookup::Found(artist) => resolved.push(artist),
            ArtistLookup::NotFound => match policy {
                MissingArtistPolicy::Fail => {
                    return Err(EtlError::ArtistNotFound(name.clone()));
                }
                MissingArtistPolicy::Skip => {
                    warn!(artist = %name, "No catalog match, skipping artist for this run");
                }
            },
        }
    }

    Ok(resolved)
}
