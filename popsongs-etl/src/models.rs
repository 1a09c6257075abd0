//! Data carried through one pipeline run
//!
//! Catalog payloads (`RawTrack` and friends) keep every field optional so the
//! transformer can name the exact missing path instead of failing inside
//! serde with a generic decode error.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bearer token for the catalog API, valid for one run
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Artist name from the config paired with its catalog id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtistRef {
    pub name: String,
    pub id: String,
}

/// Outcome of an artist search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtistLookup {
    Found(ArtistRef),
    NotFound,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RawTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    pub artists: Option<Vec<RawArtist>>,
    pub album: Option<RawAlbum>,
    pub popularity: Option<i64>,
    pub duration_ms: Option<i64>,
    pub external_urls: Option<RawExternalUrls>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RawArtist {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RawAlbum {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct RawExternalUrls {
    pub spotify: Option<String>,
}

/// Top tracks for one (artist, market) pair
///
/// The market travels with the tracks so the transformer never has to infer
/// which country a track was fetched for.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketBatch {
    pub artist: ArtistRef,
    pub country_code: String,
    pub tracks: Vec<RawTrack>,
}

/// Flattened projection of a `RawTrack`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongRecord {
    pub id_song: String,
    pub song_name: String,
    pub artist: String,
    pub album: String,
    pub popularity: i32,
    pub duration_ms: i32,
    pub song_link: String,
}

/// A validated row awaiting load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongRow {
    #[serde(flatten)]
    pub record: SongRecord,
    pub country_code: String,
    pub alternate_key: String,
}

/// A row as written to `<schema>.popular_songs`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopularSongRow {
    #[serde(flatten)]
    pub row: SongRow,
    pub timestamp_: NaiveDateTime,
}

impl PopularSongRow {
    /// Column order of the destination table
    pub const COLUMNS: [&'static str; 10] = [
        "id_song",
        "song_name",
        "artist",
        "album",
        "popularity",
        "duration_ms",
        "song_link",
        "country_code",
        "alternate_key",
        "timestamp_",
    ];
}
