//! Transform stage
//!
//! Turns market batches into validated `SongRow`s:
//!
//! 1. Flatten batches into one track sequence (market-major, then artist)
//! 2. Project each track onto a `SongRecord`
//! 3. Build the country assignment from the batches themselves, and compare it
//!    with the nominal one (`markets × artists × tracks_per_artist_per_market`)
//! 4. Pair records with countries by position, lengths verified
//! 5. Derive `alternate_key = id_song ++ country_code`
//! 6. Reject empty output and duplicate alternate keys
//!
//! Because every batch carries its own market, the assignment used for the
//! join is exact even when the catalog returns fewer tracks than the nominal
//! page size. The nominal sequence is only a consistency check.

use crate::error::{EtlError, EtlResult};
use crate::extract::Extraction;
use crate::models::{MarketBatch, RawTrack, SongRecord, SongRow};
use popsongs_common::config::PipelineConfig;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub fn transform(extraction: Extraction, pipeline: &PipelineConfig) -> EtlResult<Vec<SongRow>> {
    info!(batches = extraction.batches.len(), "Transforming extracted tracks");

    let observed = observed_assignment(&extraction.batches);
    let repeats = extraction
        .artists
        .len()
        .checked_mul(pipeline.tracks_per_artist_per_market);
    let matches_nominal = repeats.is_some_and(|repeats| {
        country_assignment(&pipeline.markets, repeats).eq(observed.iter().map(String::as_str))
    });
    if !matches_nominal {
        warn!(
            expected_rows = ?repeats.and_then(|r| r.checked_mul(pipeline.markets.len())),
            actual_rows = observed.len(),
            tracks_per_artist_per_market = pipeline.tracks_per_artist_per_market,
            "Catalog returned a different number of tracks than the nominal page size; \
             using per-batch markets"
        );
    }

    let tracks = flatten(extraction.batches);
    let records = tracks
        .iter()
        .enumerate()
        .map(|(index, track)| project_track(index, track))
        .collect::<EtlResult<Vec<_>>>()?;

    let rows = positional_join(records, observed)?;
    validate(&rows)?;

    info!(rows = rows.len(), "Transform complete");
    Ok(rows)
}

/// Concatenate batch track lists, keeping batch order
pub fn flatten(batches: Vec<MarketBatch>) -> Vec<RawTrack> {
    batches.into_iter().flat_map(|b| b.tracks).collect()
}

/// Map a catalog track onto the flat record shape
///
/// `index` is the track's position in the flattened sequence, used in errors.
pub fn project_track(index: usize, track: &RawTrack) -> EtlResult<SongRecord> {
    let artist = track
        .artists
        .as_ref()
        .and_then(|artists| artists.first())
        .and_then(|first| first.name.clone());

    Ok(SongRecord {
        id_song: present(index, "id", track.id.clone())?,
        song_name: present(index, "name", track.name.clone())?,
        artist: present(index, "artists[0].name", artist)?,
        album: present(
            index,
            "album.name",
            track.album.as_ref().and_then(|a| a.name.clone()),
        )?,
        popularity: to_i32(index, "popularity", track.popularity)?,
        duration_ms: to_i32(index, "duration_ms", track.duration_ms)?,
        song_link: present(
            index,
            "external_urls.spotify",
            track.external_urls.as_ref().and_then(|u| u.spotify.clone()),
        )?,
    })
}

fn present<T>(index: usize, path: &str, value: Option<T>) -> EtlResult<T> {
    value.ok_or_else(|| EtlError::MalformedRecord(format!("track #{}: missing {}", index, path)))
}

fn to_i32(index: usize, path: &str, value: Option<i64>) -> EtlResult<i32> {
    let value = present(index, path, value)?;
    i32::try_from(value).map_err(|_| {
        EtlError::MalformedRecord(format!(
            "track #{}: {} value {} out of range",
            index, path, value
        ))
    })
}

/// Repeat each market `repeats` times, market-major
///
/// `country_assignment(["AR", "BR"], 20)` yields twenty "AR" followed by
/// twenty "BR". The sequence is lazy, so comparing it against a shorter one
/// stops at the first difference.
pub fn country_assignment(
    markets: &[String],
    repeats: usize,
) -> impl Iterator<Item = &str> + '_ {
    markets
        .iter()
        .flat_map(move |market| std::iter::repeat(market.as_str()).take(repeats))
}

/// One copy of each batch's market per track the batch actually holds
pub fn observed_assignment(batches: &[MarketBatch]) -> Vec<String> {
    batches
        .iter()
        .flat_map(|b| std::iter::repeat(b.country_code.clone()).take(b.tracks.len()))
        .collect()
}

/// Pair record *i* with country *i*
///
/// # Errors
/// `EtlError::Alignment` when the sequences differ in length.
pub fn positional_join(records: Vec<SongRecord>, countries: Vec<String>) -> EtlResult<Vec<SongRow>> {
    if records.len() != countries.len() {
        return Err(EtlError::Alignment {
            records: records.len(),
            assignments: countries.len(),
        });
    }

    Ok(records
        .into_iter()
        .zip(countries)
        .map(|(record, country_code)| {
            let alternate_key = alternate_key(&record.id_song, &country_code);
            SongRow {
                record,
                country_code,
                alternate_key,
            }
        })
        .collect())
}

/// `id_song` immediately followed by `country_code`, no delimiter
pub fn alternate_key(id_song: &str, country_code: &str) -> String {
    format!("{}{}", id_song, country_code)
}

/// Reject an empty row set or one with repeated alternate keys
pub fn validate(rows: &[SongRow]) -> EtlResult<()> {
    if rows.is_empty() {
        return Err(EtlError::EmptyResult);
    }

    let mut seen = HashSet::with_capacity(rows.len());
    let mut first_duplicate = None;
    for row in rows {
        if !seen.insert(row.alternate_key.as_str()) && first_duplicate.is_none() {
            first_duplicate = Some(row.alternate_key.clone());
        }
    }

    if let Some(duplicate) = first_duplicate {
        return Err(EtlError::DuplicateKey {
            rows: rows.len(),
            distinct: seen.len(),
            duplicate,
        });
    }

    debug!(rows = rows.len(), "Row set passed validation");
    Ok(())
}
