//! Load stage
//!
//! Stamps every row with one load timestamp and appends the batch to
//! `<schema>.popular_songs` with multi-row `INSERT`s inside one transaction.
//! Redshift's `COPY` cannot read from the client connection, so rows are
//! bound into `INSERT`s. The commit either lands every row or none.

use crate::error::{EtlError, EtlResult};
use crate::models::{PopularSongRow, SongRow};
use async_trait::async_trait;
use chrono::{NaiveDateTime, SubsecRound, Utc};
use popsongs_common::config::WarehouseSettings;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Postgres, QueryBuilder};
use std::str::FromStr;
use tracing::{debug, info};

/// Destination for finished rows
#[async_trait]
pub trait SongSink: Send + Sync {
    /// Append all rows to `table` in one operation; returns rows written
    async fn append(&self, table: &str, rows: &[PopularSongRow]) -> EtlResult<u64>;
}

/// Outcome of a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub rows: u64,
    pub loaded_at: NaiveDateTime,
}

/// Stamp `rows` with a timestamp captured once, then append them to `table`
pub async fn load<S>(sink: &S, table: &str, rows: Vec<SongRow>) -> EtlResult<LoadReport>
where
    S: SongSink + ?Sized,
{
    let loaded_at = load_timestamp();
    info!(rows = rows.len(), table, loaded_at = %loaded_at, "Loading rows");

    let stamped = stamp(rows, loaded_at);
    let written = sink.append(table, &stamped).await?;

    if written != stamped.len() as u64 {
        return Err(EtlError::Load(format!(
            "sink reported {} rows written, expected {}",
            written,
            stamped.len()
        )));
    }

    info!(rows = written, table, "Load complete");
    Ok(LoadReport {
        rows: written,
        loaded_at,
    })
}

/// Current UTC time at whole-second precision
pub fn load_timestamp() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(0)
}

pub fn stamp(rows: Vec<SongRow>, loaded_at: NaiveDateTime) -> Vec<PopularSongRow> {
    rows.into_iter()
        .map(|row| PopularSongRow {
            row,
            timestamp_: loaded_at,
        })
        .collect()
}

/// Rows per `INSERT`; ten binds each keeps a statement far below the
/// protocol's 65535 parameter limit
pub const INSERT_CHUNK_ROWS: usize = 500;

/// Multi-row `INSERT INTO <table> (<columns>) VALUES (...), (...)` for `rows`
pub fn insert_statement<'a>(table: &str, rows: &'a [PopularSongRow]) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        table,
        PopularSongRow::COLUMNS.join(", ")
    ));
    builder.push_values(rows, |mut values, stamped| {
        let row = &stamped.row;
        let record = &row.record;
        values
            .push_bind(record.id_song.as_str())
            .push_bind(record.song_name.as_str())
            .push_bind(record.artist.as_str())
            .push_bind(record.album.as_str())
            .push_bind(record.popularity)
            .push_bind(record.duration_ms)
            .push_bind(record.song_link.as_str())
            .push_bind(row.country_code.as_str())
            .push_bind(row.alternate_key.as_str())
            .push_bind(stamped.timestamp_);
    });
    builder
}

/// Rewrite JDBC/Redshift URL forms into one sqlx understands
///
/// `jdbc:redshift://host:5439/db` → `postgres://host:5439/db`
pub fn normalize_url(url: &str) -> EtlResult<String> {
    let url = url.trim();
    let url = url.strip_prefix("jdbc:").unwrap_or(url);

    let rest = ["postgres://", "postgresql://", "redshift://"]
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme))
        .ok_or_else(|| {
            popsongs_common::Error::InvalidInput(format!(
                "unsupported warehouse URL scheme: {}",
                url.split("://").next().unwrap_or(url)
            ))
        })?;

    Ok(format!("postgres://{}", rest))
}

/// Connection options from settings; user and password override the URL's
pub fn connect_options(settings: &WarehouseSettings) -> EtlResult<PgConnectOptions> {
    let url = normalize_url(&settings.url)?;
    let options = PgConnectOptions::from_str(&url).map_err(|e| {
        popsongs_common::Error::InvalidInput(format!("invalid warehouse URL: {}", e))
    })?;
    Ok(options.username(&settings.user).password(&settings.password))
}

/// Postgres-protocol warehouse sink
pub struct PostgresSink {
    options: PgConnectOptions,
}

impl PostgresSink {
    pub fn new(settings: &WarehouseSettings) -> EtlResult<Self> {
        Ok(Self {
            options: connect_options(settings)?,
        })
    }
}

#[async_trait]
impl SongSink for PostgresSink {
    async fn append(&self, table: &str, rows: &[PopularSongRow]) -> EtlResult<u64> {
        let mut conn = PgConnection::connect_with(&self.options).await?;

        // Dropping the transaction on an early return rolls it back
        let mut tx = conn.begin().await?;
        let mut written = 0u64;
        for (index, chunk) in rows.chunks(INSERT_CHUNK_ROWS).enumerate() {
            let mut statement = insert_statement(table, chunk);
            let result = statement.build().execute(&mut *tx).await?;
            debug!(chunk = index, rows = result.rows_affected(), "Inserted chunk");
            written += result.rows_affected();
        }
        tx.commit().await?;

        conn.close().await?;
        Ok(written)
    }
}
