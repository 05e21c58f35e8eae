use std::path::PathBuf;

use emissions_model::{
    domain::{JobType, JoinedRecord},
    timestamp::format_rfc3339,
};
use futures::StreamExt;

use crate::pipeline::{PipelineError, Sink};

/// Writes joined records as a delimited table with a header row and no
/// index column. Unmatched records get empty intensity/emissions cells.
pub struct CsvFileSink {
    path: PathBuf,
    delimiter: u8,
}

impl CsvFileSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[derive(serde::Serialize)]
struct OutputRow<'a> {
    #[serde(rename = "User")]
    user: &'a str,
    #[serde(rename = "Start")]
    start: String,
    #[serde(rename = "End")]
    end: String,
    #[serde(rename = "ConsumedEnergyRaw")]
    consumed_energy_raw: u64,
    #[serde(rename = "AllocTRES")]
    alloc_tres: Option<&'a str>,
    #[serde(rename = "energy_kWh")]
    energy_kwh: f64,
    job_key: &'a str,
    is_gpu_job: bool,
    job_type: JobType,
    start_hour_utc: String,
    #[serde(rename = "ci_g_per_kWh")]
    ci_g_per_kwh: Option<f64>,
    emissions_kg: Option<f64>,
}

impl<'a> From<&'a JoinedRecord> for OutputRow<'a> {
    fn from(r: &'a JoinedRecord) -> Self {
        let job = &r.job;
        OutputRow {
            user: &job.user,
            start: format_rfc3339(job.start),
            end: format_rfc3339(job.end),
            consumed_energy_raw: job.consumed_energy_raw,
            alloc_tres: job.alloc_resources.as_deref(),
            energy_kwh: job.energy_kwh,
            job_key: &job.job_key,
            is_gpu_job: job.is_gpu_job(),
            job_type: job.job_type,
            start_hour_utc: format_rfc3339(job.start_hour_utc),
            ci_g_per_kwh: r.ci_g_per_kwh,
            emissions_kg: r.emissions_kg,
        }
    }
}

#[async_trait::async_trait]
impl Sink<JoinedRecord> for CsvFileSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<JoinedRecord, PipelineError>> + Send + Unpin + 'static,
    {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(&self.path)
            .map_err(|e| PipelineError::Sink(format!("failed to create {}: {e}", self.path.display())))?;
        let mut written: u64 = 0;

        while let Some(item) = input.next().await {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(error = %e, rows_written = written, "upstream error, aborting result file");
                    return Err(e);
                }
            };

            writer
                .serialize(OutputRow::from(&record))
                .map_err(|e| PipelineError::Sink(format!("failed to write result row: {e}")))?;
            written += 1;
        }

        writer
            .flush()
            .map_err(|e| PipelineError::Sink(format!("failed to flush {}: {e}", self.path.display())))?;

        metrics::counter!("result_rows_written_total").increment(written);
        tracing::info!(rows = written, path = %self.path.display(), "Results saved");
        Ok(())
    }
}
