//! Error types for popsongs-etl
//!
//! Every variant is terminal for the run: nothing in the pipeline catches and
//! recovers from an `EtlError`.

use thiserror::Error;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum EtlError {
    /// Token endpoint rejected the client credentials or was unreachable
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Artist search call failed
    #[error("Artist lookup failed for '{artist}': {message}")]
    Lookup { artist: String, message: String },

    /// Artist search returned no match and the run is configured to fail
    #[error("No catalog artist matches '{0}'")]
    ArtistNotFound(String),

    /// Top-tracks call failed
    #[error("Top tracks fetch failed for artist {artist_id} in market {market}: {message}")]
    Fetch {
        artist_id: String,
        market: String,
        message: String,
    },

    /// A track payload is missing an expected field
    #[error("Malformed track record: {0}")]
    MalformedRecord(String),

    /// Transform produced no rows
    #[error("Transformed record set is empty")]
    EmptyResult,

    /// Two rows share an alternate key
    #[error("alternate_key is not unique: {rows} rows but {distinct} distinct keys (first duplicate: {duplicate})")]
    DuplicateKey {
        rows: usize,
        distinct: usize,
        duplicate: String,
    },

    /// Record and country sequences differ in length
    #[error("Cannot pair {records} records with {assignments} country assignments")]
    Alignment { records: usize, assignments: usize },

    /// Warehouse write failed
    #[error("Load failed: {0}")]
    Load(String),

    /// Configuration error from popsongs-common
    #[error("Config error: {0}")]
    Config(#[from] popsongs_common::Error),
}

impl From<sqlx::Error> for EtlError {
    fn from(err: sqlx::Error) -> Self {
        EtlError::Load(err.to_string())
    }
}

/// Result type for pipeline operations
pub type EtlResult<T> = Result<T, EtlError>;
