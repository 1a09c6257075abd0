//! One pass of extract → transform → load
//!
//! Stages run strictly in sequence; the first error aborts the run. Nothing
//! reaches the sink unless the transform's validation passed.

use crate::catalog::CatalogApi;
use crate::error::{EtlError, EtlResult};
use crate::extract::extract;
use crate::load::{load, SongSink};
use crate::models::SongRow;
use crate::transform::transform;
use chrono::NaiveDateTime;
use popsongs_common::config::{ClientCredentials, PipelineConfig};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Validated rows ready to load
#[derive(Debug, Clone)]
pub struct Prepared {
    pub artists_resolved: usize,
    pub batches: usize,
    pub rows: Vec<SongRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub artists_resolved: usize,
    pub batches: usize,
    pub rows: u64,
    pub loaded_at: NaiveDateTime,
}

/// Extract and transform, stopping short of the load
pub async fn prepare<C>(
    pipeline: &PipelineConfig,
    credentials: &ClientCredentials,
    catalog: &C,
) -> EtlResult<Prepared>
where
    C: CatalogApi + ?Sized,
{
    pipeline.validate()?;

    let extraction = extract(catalog, credentials, pipeline).await?;
    let artists_resolved = extraction.artists.len();
    let batches = extraction.batches.len();

    let rows = transform(extraction, pipeline)?;

    Ok(Prepared {
        artists_resolved,
        batches,
        rows,
    })
}

/// Full run: extract, transform, then append to `table` through `sink`
pub async fn run<C, S>(
    pipeline: &PipelineConfig,
    credentials: &ClientCredentials,
    catalog: &C,
    sink: &S,
    table: &str,
) -> EtlResult<RunSummary>
where
    C: CatalogApi + ?Sized,
    S: SongSink + ?Sized,
{
    let span = info_span!("run", run_id = %Uuid::new_v4());

    async {
        let prepared = prepare(pipeline, credentials, catalog).await?;
        let report = load(sink, table, prepared.rows).await?;

        let summary = RunSummary {
            artists_resolved: prepared.artists_resolved,
            batches: prepared.batches,
            rows: report.rows,
            loaded_at: report.loaded_at,
        };
        info!(
            artists = summary.artists_resolved,
            batches = summary.batches,
            rows = summary.rows,
            table,
            "Run complete"
        );
        Ok::<_, EtlError>(summary)
    }
    .instrument(span)
    .await
}
