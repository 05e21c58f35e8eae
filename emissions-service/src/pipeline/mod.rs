use std::pin::Pin;

use emissions_model::{
    domain::{AggregateSummary, CarbonIntensitySeries, JobRecord, JoinedRecord},
    timestamp::format_rfc3339,
};
use futures::{Stream, TryStreamExt};
use time::Duration;

use crate::{
    aggregate,
    config::AppConfig,
    fetch::{CarbonIntensityApi, CarbonIntensityFetcher, ChunkFailure},
    sinks::CsvFileSink,
    sources::{accounting_log::RawJobRow, AccountingLogSource, ElectricityMapsClient},
    transform::{bucket, DroppedRow, Normalizer},
};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("no job records to process")]
    EmptyInput,
    #[error("no carbon intensity data retrieved ({} chunk(s) failed)", .failed_chunks.len())]
    NoCarbonData { failed_chunks: Vec<ChunkFailure> },
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> Pin<Box<dyn Stream<Item = Result<T, PipelineError>> + Send>>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<T, PipelineError>> + Send + Unpin + 'static;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Emissions were computed and written to the sink.
    Completed,
    /// No accounting row survived normalization; nothing was fetched.
    NoRecords,
    /// Every carbon-intensity chunk failed or came back empty; no join ran.
    NoCarbonData,
}

#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    pub joined: Vec<JoinedRecord>,
    pub summary: AggregateSummary,
    pub dropped: Vec<DroppedRow>,
    pub failed_chunks: Vec<ChunkFailure>,
}

impl RunReport {
    fn without_emissions(status: RunStatus, dropped: Vec<DroppedRow>, failed_chunks: Vec<ChunkFailure>) -> Self {
        Self {
            status,
            joined: Vec::new(),
            summary: AggregateSummary::empty(),
            dropped,
            failed_chunks,
        }
    }
}

/// Accounting log in, annotated job table out.
///
/// Stages run strictly in order: read, normalize, bucket, fetch, join,
/// write. Malformed rows and failed chunks are absorbed and reported in the
/// [`RunReport`]; only I/O failures of the source or sink surface as errors.
pub struct EmissionsPipeline<S, A, K> {
    pub source: S,
    pub normalizer: Normalizer,
    pub fetcher: CarbonIntensityFetcher<A>,
    pub sink: K,
    pub span_margin: Duration,
}

impl EmissionsPipeline<AccountingLogSource, ElectricityMapsClient, CsvFileSink> {
    pub fn from_config(cfg: &AppConfig) -> Result<Self, PipelineError> {
        let source = AccountingLogSource::new(&cfg.accounting.path).with_delimiter(cfg.accounting.delimiter()?);
        let normalizer = Normalizer::new(cfg.accounting.gpu_marker.clone(), cfg.accounting.naive_offset()?);

        let ci = &cfg.carbon_intensity;
        let client = ElectricityMapsClient::new(&ci.base_url, ci.auth_token()?, ci.request_timeout())
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
        let fetcher = CarbonIntensityFetcher::new(client, ci.fetcher_config()?);

        let sink = CsvFileSink::new(&cfg.output.path).with_delimiter(cfg.output.delimiter()?);

        Ok(Self {
            source,
            normalizer,
            fetcher,
            sink,
            span_margin: ci.span_margin()?,
        })
    }
}

impl<S, A, K> EmissionsPipeline<S, A, K>
where
    S: Source<RawJobRow>,
    A: CarbonIntensityApi,
    K: Sink<JoinedRecord>,
{
    pub async fn run(self) -> Result<RunReport, PipelineError> {
        let rows: Vec<RawJobRow> = self.source.stream().await.try_collect().await?;
        let total_rows = rows.len();

        let normalized = self.normalizer.normalize(rows);
        tracing::info!(
            rows = total_rows,
            kept = normalized.kept.len(),
            dropped = normalized.dropped.len(),
            "accounting log normalized"
        );

        let span = match bucket::required_span(&normalized.kept, self.span_margin) {
            Ok(span) => span,
            Err(PipelineError::EmptyInput) => {
                tracing::warn!("no valid job records; skipping carbon intensity retrieval");
                return Ok(RunReport::without_emissions(RunStatus::NoRecords, normalized.dropped, Vec::new()));
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            zone = %self.fetcher.config().zone,
            span_start = %format_rfc3339(span.start),
            span_end = %format_rfc3339(span.end),
            "Fetching CI data for range"
        );

        let outcome = match self.fetcher.fetch(span).await {
            Ok(outcome) => outcome,
            Err(PipelineError::NoCarbonData { failed_chunks }) => {
                tracing::warn!(failed_chunks = failed_chunks.len(), "No carbon intensity data retrieved");
                return Ok(RunReport::without_emissions(
                    RunStatus::NoCarbonData,
                    normalized.dropped,
                    failed_chunks,
                ));
            }
            Err(e) => return Err(e),
        };
        tracing::info!(
            chunks = outcome.chunks,
            failed = outcome.failed_chunks.len(),
            "carbon intensity retrieval finished"
        );
        log_coverage(&normalized.kept, &outcome.series);

        let joined = aggregate::join(&normalized.kept, &outcome.series);
        let summary = aggregate::summarize(&joined);
        tracing::info!(
            matched = summary.matched_jobs,
            total = summary.total_jobs,
            "After merge: jobs matched with CI data"
        );

        let rows = futures::stream::iter(joined.clone().into_iter().map(Ok::<_, PipelineError>));
        self.sink.run(rows).await?;

        Ok(RunReport {
            status: RunStatus::Completed,
            joined,
            summary,
            dropped: normalized.dropped,
            failed_chunks: outcome.failed_chunks,
        })
    }
}

fn log_coverage(records: &[JobRecord], series: &CarbonIntensitySeries) {
    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        tracing::info!(
            samples = series.len(),
            from = %format_rfc3339(first.datetime),
            to = %format_rfc3339(last.datetime),
            "Fetched CI data"
        );
    }

    let hours = records.iter().map(|r| r.start_hour_utc);
    if let (Some(min), Some(max)) = (hours.clone().min(), hours.max()) {
        tracing::info!(
            from = %format_rfc3339(min),
            to = %format_rfc3339(max),
            "Required job times"
        );
    }
}
