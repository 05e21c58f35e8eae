use std::{fs::File, path::PathBuf};

use csv::StringRecord;
use futures::Stream;

use crate::pipeline::{PipelineError, Source};

pub const COL_USER: &str = "User";
pub const COL_START: &str = "Start";
pub const COL_END: &str = "End";
pub const COL_CONSUMED_ENERGY_RAW: &str = "ConsumedEnergyRaw";
pub const COL_ALLOC_TRES: &str = "AllocTRES";

/// One undecoded accounting row. Empty cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawJobRow {
    /// 1-based line in the source file.
    pub line: u64,
    pub user: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub consumed_energy_raw: Option<String>,
    pub alloc_tres: Option<String>,
}

/// Delimited accounting log (`sacct --parsable2` output by default).
///
/// Header names are matched after trimming whitespace, so padded exports
/// such as `  ConsumedEnergyRaw ` are accepted. Only the five columns in
/// [`RawJobRow`] are read; any others are ignored.
pub struct AccountingLogSource {
    path: PathBuf,
    delimiter: u8,
}

impl AccountingLogSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            delimiter: b'|',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    user: usize,
    start: usize,
    end: usize,
    consumed_energy_raw: usize,
    alloc_tres: usize,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Result<Self, PipelineError> {
        let find = |name: &str| -> Result<usize, PipelineError> {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| PipelineError::Source(format!("missing column '{name}' in accounting log header")))
        };

        Ok(Self {
            user: find(COL_USER)?,
            start: find(COL_START)?,
            end: find(COL_END)?,
            consumed_energy_raw: find(COL_CONSUMED_ENERGY_RAW)?,
            alloc_tres: find(COL_ALLOC_TRES)?,
        })
    }
}

fn parse_optional_string(s: Option<&str>) -> Option<String> {
    let trimmed = s?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn record_to_raw_row(record: &StringRecord, columns: ColumnIndex) -> RawJobRow {
    RawJobRow {
        line: record.position().map(|p| p.line()).unwrap_or_default(),
        user: parse_optional_string(record.get(columns.user)),
        start: parse_optional_string(record.get(columns.start)),
        end: parse_optional_string(record.get(columns.end)),
        consumed_energy_raw: parse_optional_string(record.get(columns.consumed_energy_raw)),
        alloc_tres: parse_optional_string(record.get(columns.alloc_tres)),
    }
}

#[async_trait::async_trait]
impl Source<RawJobRow> for AccountingLogSource {
    async fn stream(&self) -> std::pin::Pin<Box<dyn Stream<Item = Result<RawJobRow, PipelineError>> + Send>> {
        let path = self.path.clone();
        let delimiter = self.delimiter;
        let s = async_stream::try_stream! {
            let file = File::open(&path).map_err(|e| {
                PipelineError::Source(format!("failed to open accounting log {}: {e}", path.display()))
            })?;
            let mut rdr = csv::ReaderBuilder::new()
                .delimiter(delimiter)
                .flexible(true)
                .from_reader(file);
            let headers = rdr
                .headers()
                .map_err(|e| PipelineError::Source(format!("failed to read accounting log header: {e}")))?
                .clone();
            let columns = ColumnIndex::from_headers(&headers)?;

            for result in rdr.records() {
                let record = result.map_err(|e| PipelineError::Source(format!(
                    "failed to read accounting log record: {e}"
                )))?;

                metrics::counter!("accounting_rows_total").increment(1);
                yield record_to_raw_row(&record, columns);
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use std::io::Write;

    fn write_log(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write log");
        file
    }

    #[tokio::test]
    async fn reads_rows_with_padded_headers_and_extra_columns() {
        let file = write_log(
            " JobID | User |Start|End| ConsumedEnergyRaw |AllocTRES|\n\
             101|alice|2024-09-16T10:15:00|2024-09-16T11:00:00|3600000|cpu=4,gres/gpu=1|\n\
             101.batch||2024-09-16T10:15:00|2024-09-16T11:00:00|0||\n",
        );

        let rows: Vec<RawJobRow> = AccountingLogSource::new(file.path())
            .stream()
            .await
            .try_collect()
            .await
            .expect("rows");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].user.as_deref(), Some("alice"));
        assert_eq!(rows[0].start.as_deref(), Some("2024-09-16T10:15:00"));
        assert_eq!(rows[0].consumed_energy_raw.as_deref(), Some("3600000"));
        assert_eq!(rows[0].alloc_tres.as_deref(), Some("cpu=4,gres/gpu=1"));
        assert_eq!(rows[0].line, 2);

        assert_eq!(rows[1].user, None);
        assert_eq!(rows[1].alloc_tres, None);
        assert_eq!(rows[1].line, 3);
    }

    #[tokio::test]
    async fn short_rows_yield_missing_fields() {
        let file = write_log("User|Start|End|ConsumedEnergyRaw|AllocTRES\nbob|2024-09-16T10:15:00\n");

        let rows: Vec<RawJobRow> = AccountingLogSource::new(file.path())
            .stream()
            .await
            .try_collect()
            .await
            .expect("rows");

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].end, None);
        assert_eq!(rows[0].consumed_energy_raw, None);
    }

    #[tokio::test]
    async fn missing_required_column_is_a_source_error() {
        let file = write_log("User|Start|End|AllocTRES\nbob|a|b|c\n");

        let res: Result<Vec<RawJobRow>, PipelineError> =
            AccountingLogSource::new(file.path()).stream().await.try_collect().await;

        match res {
            Err(PipelineError::Source(msg)) => assert!(msg.contains("ConsumedEnergyRaw")),
            other => panic!("expected source error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_delimiter_is_honoured() {
        let file = write_log("User,Start,End,ConsumedEnergyRaw,AllocTRES\ncarol,s,e,10,\n");

        let rows: Vec<RawJobRow> = AccountingLogSource::new(file.path())
            .with_delimiter(b',')
            .stream()
            .await
            .try_collect()
            .await
            .expect("rows");

        assert_eq!(rows[0].user.as_deref(), Some("carol"));
        assert_eq!(rows[0].alloc_tres, None);
    }
}
