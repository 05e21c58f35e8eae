use std::collections::{btree_map::Entry, BTreeMap};

use emissions_model::{
    domain::{CarbonIntensitySample, CarbonIntensitySeries, TimeSpan},
    timestamp::format_rfc3339,
};
use futures::StreamExt;
use time::{Duration, OffsetDateTime};

use crate::pipeline::PipelineError;

/// Longest range the provider accepts in a single past-range query.
pub const DEFAULT_MAX_CHUNK: Duration = Duration::days(10);

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode provider response: {0}")]
    Decode(String),
    #[error("failed to format range bound: {0}")]
    Format(#[from] time::error::Format),
}

/// A remote source of historical carbon intensity for one grid zone.
///
/// Each call is a single bounded request; implementations must not retry.
#[async_trait::async_trait]
pub trait CarbonIntensityApi: Send + Sync {
    async fn fetch_range(&self, zone: &str, range: TimeSpan) -> Result<Vec<CarbonIntensitySample>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub zone: String,
    pub max_chunk: Duration,
    pub max_concurrent_requests: usize,
}

impl FetcherConfig {
    pub fn new(zone: impl Into<String>) -> Self {
        Self {
            zone: zone.into(),
            max_chunk: DEFAULT_MAX_CHUNK,
            max_concurrent_requests: 1,
        }
    }
}

#[derive(Debug)]
pub struct ChunkFailure {
    pub index: usize,
    pub range: TimeSpan,
    pub error: FetchError,
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub series: CarbonIntensitySeries,
    pub chunks: usize,
    pub failed_chunks: Vec<ChunkFailure>,
}

#[derive(Debug, Clone)]
pub struct ChunkSamples {
    pub index: usize,
    pub range: TimeSpan,
    pub samples: Vec<CarbonIntensitySample>,
}

/// Splits `span` into consecutive sub-ranges of at most `max_chunk`.
///
/// The sub-ranges are contiguous, do not overlap and cover `span` exactly;
/// only the last one may be shorter than `max_chunk`.
pub fn split_span(span: TimeSpan, max_chunk: Duration) -> Result<Vec<TimeSpan>, PipelineError> {
    if !max_chunk.is_positive() {
        return Err(PipelineError::Config(format!(
            "max chunk duration must be positive, got {max_chunk}"
        )));
    }

    let mut chunks = Vec::new();
    let mut current = span.start;
    while current < span.end {
        let next = current.checked_add(max_chunk).map_or(span.end, |n| n.min(span.end));
        chunks.push(TimeSpan::new(current, next));
        current = next;
    }
    Ok(chunks)
}

/// Merges per-chunk samples into one series.
///
/// When several chunks carry a sample for the same `datetime`, the one from
/// the chunk whose midpoint is closest to it wins, and on a tie the chunk
/// with the lower index. Within a chunk the first sample wins. The result
/// does not depend on the order of `chunks`.
pub fn merge_chunks(chunks: &[ChunkSamples]) -> CarbonIntensitySeries {
    let mut best: BTreeMap<OffsetDateTime, (Duration, usize, f64)> = BTreeMap::new();

    for chunk in chunks {
        let midpoint = chunk.range.midpoint();
        for sample in &chunk.samples {
            let distance = (sample.datetime - midpoint).abs();
            let candidate = (distance, chunk.index, sample.ci_g_per_kwh);
            match best.entry(sample.datetime) {
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                Entry::Occupied(mut slot) => {
                    let (held_distance, held_index, _) = *slot.get();
                    if (distance, chunk.index) < (held_distance, held_index) {
                        slot.insert(candidate);
                    }
                }
            }
        }
    }

    CarbonIntensitySeries::from_samples(best.into_iter().map(|(datetime, (_, _, ci_g_per_kwh))| {
        CarbonIntensitySample { datetime, ci_g_per_kwh }
    }))
}

pub struct CarbonIntensityFetcher<A> {
    api: A,
    config: FetcherConfig,
}

impl<A> CarbonIntensityFetcher<A>
where
    A: CarbonIntensityApi,
{
    pub fn new(api: A, config: FetcherConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Retrieves carbon intensity covering `span`.
    ///
    /// Failed chunks are logged and returned in `failed_chunks`; the other
    /// chunks still contribute. Returns [`PipelineError::NoCarbonData`] when
    /// the merged series is empty.
    pub async fn fetch(&self, span: TimeSpan) -> Result<FetchOutcome, PipelineError> {
        let ranges = split_span(span, self.config.max_chunk)?;
        let total = ranges.len();
        let api = &self.api;
        let zone = self.config.zone.as_str();

        // `buffered` yields in input order, so results line up with `ranges`.
        let results: Vec<(usize, TimeSpan, Result<Vec<CarbonIntensitySample>, FetchError>)> =
            futures::stream::iter(ranges.into_iter().enumerate())
                .map(|(index, range)| async move {
                    tracing::info!(
                        chunk = index + 1,
                        of = total,
                        chunk_start = %format_rfc3339(range.start),
                        chunk_end = %format_rfc3339(range.end),
                        "Fetching chunk"
                    );
                    metrics::counter!("carbon_intensity_chunks_total").increment(1);
                    (index, range, api.fetch_range(zone, range).await)
                })
                .buffered(self.config.max_concurrent_requests.max(1))
                .collect()
                .await;

        let mut retrieved = Vec::with_capacity(results.len());
        let mut failed_chunks = Vec::new();
        for (index, range, result) in results {
            match result {
                Ok(samples) => {
                    metrics::counter!("carbon_intensity_samples_total").increment(samples.len() as u64);
                    retrieved.push(ChunkSamples { index, range, samples });
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        chunk_start = %format_rfc3339(range.start),
                        chunk_end = %format_rfc3339(range.end),
                        "carbon intensity chunk failed, continuing without it"
                    );
                    metrics::counter!("carbon_intensity_chunk_failures_total").increment(1);
                    failed_chunks.push(ChunkFailure { index, range, error });
                }
            }
        }

        let series = merge_chunks(&retrieved);
        if series.is_empty() {
            return Err(PipelineError::NoCarbonData { failed_chunks });
        }

        Ok(FetchOutcome {
            series,
            chunks: total,
            failed_chunks,
        })
    }
}
