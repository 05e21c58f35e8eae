use std::collections::BTreeMap;

use emissions_model::{
    domain::{job_record::energy_kwh, JobRecord, JobType},
    timestamp::{format_rfc3339, to_utc},
};
use time::{OffsetDateTime, UtcOffset};

use crate::{sources::accounting_log::RawJobRow, transform::bucket::floor_to_hour};

pub const DEFAULT_GPU_MARKER: &str = "gres/gpu";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DropReason {
    MissingStart,
    InvalidStart,
    MissingEnd,
    InvalidEnd,
    MissingEnergy,
    InvalidEnergy,
    NonPositiveEnergy,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::MissingStart => "missing_start",
            DropReason::InvalidStart => "invalid_start",
            DropReason::MissingEnd => "missing_end",
            DropReason::InvalidEnd => "invalid_end",
            DropReason::MissingEnergy => "missing_energy",
            DropReason::InvalidEnergy => "invalid_energy",
            DropReason::NonPositiveEnergy => "non_positive_energy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRow {
    pub line: u64,
    pub reason: DropReason,
}

/// Result of normalizing an accounting log: every input row ends up in
/// exactly one of `kept` or `dropped`.
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub kept: Vec<JobRecord>,
    pub dropped: Vec<DroppedRow>,
}

impl Normalized {
    pub fn drop_counts(&self) -> BTreeMap<DropReason, usize> {
        let mut counts = BTreeMap::new();
        for d in &self.dropped {
            *counts.entry(d.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Turns raw accounting rows into `JobRecord`s.
///
/// A row is kept iff `Start` and `End` parse and `ConsumedEnergyRaw` is a
/// positive integer.
#[derive(Debug, Clone)]
pub struct Normalizer {
    gpu_marker: String,
    naive_offset: UtcOffset,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_GPU_MARKER, UtcOffset::UTC)
    }
}

impl Normalizer {
    pub fn new(gpu_marker: impl Into<String>, naive_offset: UtcOffset) -> Self {
        Self {
            gpu_marker: gpu_marker.into(),
            naive_offset,
        }
    }

    pub fn normalize<I>(&self, rows: I) -> Normalized
    where
        I: IntoIterator<Item = RawJobRow>,
    {
        let mut out = Normalized::default();

        for row in rows {
            let line = row.line;
            match self.normalize_row(row) {
                Ok(record) => out.kept.push(record),
                Err(reason) => {
                    tracing::debug!(line, reason = reason.as_str(), "dropping accounting row");
                    metrics::counter!("accounting_rows_dropped_total", "reason" => reason.as_str()).increment(1);
                    out.dropped.push(DroppedRow { line, reason });
                }
            }
        }

        for (reason, count) in out.drop_counts() {
            tracing::info!(reason = reason.as_str(), count, "accounting rows dropped");
        }

        out
    }

    pub fn normalize_row(&self, row: RawJobRow) -> Result<JobRecord, DropReason> {
        let start = self.parse_timestamp(row.start.as_deref(), DropReason::MissingStart, DropReason::InvalidStart)?;
        let end = self.parse_timestamp(row.end.as_deref(), DropReason::MissingEnd, DropReason::InvalidEnd)?;
        let consumed_energy_raw = parse_energy(row.consumed_energy_raw.as_deref())?;

        let user = row.user.unwrap_or_default();
        let is_gpu_job = row
            .alloc_tres
            .as_deref()
            .is_some_and(|tres| tres.contains(self.gpu_marker.as_str()));

        Ok(JobRecord {
            job_key: format!("{user}_{}", format_rfc3339(start)),
            user,
            start,
            end,
            consumed_energy_raw,
            alloc_resources: row.alloc_tres,
            energy_kwh: energy_kwh(consumed_energy_raw),
            job_type: if is_gpu_job { JobType::Gpu } else { JobType::Cpu },
            start_hour_utc: floor_to_hour(start),
        })
    }

    fn parse_timestamp(
        &self,
        raw: Option<&str>,
        missing: DropReason,
        invalid: DropReason,
    ) -> Result<OffsetDateTime, DropReason> {
        let raw = raw.ok_or(missing)?;
        to_utc(raw, self.naive_offset).map_err(|_| invalid)
    }
}

fn parse_energy(raw: Option<&str>) -> Result<u64, DropReason> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty()).ok_or(DropReason::MissingEnergy)?;
    let value: i64 = raw.parse().map_err(|_| DropReason::InvalidEnergy)?;
    if value <= 0 {
        return Err(DropReason::NonPositiveEnergy);
    }
    Ok(value as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    fn row(start: &str, end: &str, energy: &str, tres: Option<&str>) -> RawJobRow {
        let opt = |s: &str| if s.is_empty() { None } else { Some(s.to_string()) };
        RawJobRow {
            line: 2,
            user: Some("alice".to_string()),
            start: opt(start),
            end: opt(end),
            consumed_energy_raw: opt(energy),
            alloc_tres: tres.map(str::to_string),
        }
    }

    #[test]
    fn gpu_job_is_normalized_and_bucketed() {
        let record = Normalizer::default()
            .normalize_row(row(
                "2024-09-16T10:15:00Z",
                "2024-09-16T11:00:00Z",
                "3600000",
                Some("gres/gpu:1"),
            ))
            .expect("kept");

        assert_eq!(record.energy_kwh, 1.0);
        assert_eq!(record.job_type, JobType::Gpu);
        assert!(record.is_gpu_job());
        assert_eq!(record.start_hour_utc, datetime!(2024-09-16 10:00:00 UTC));
        assert_eq!(record.job_key, "alice_2024-09-16T10:15:00Z");
    }

    #[test]
    fn missing_descriptor_is_cpu() {
        let record = Normalizer::default()
            .normalize_row(row("2024-09-16T10:15:00", "2024-09-16T11:00:00", "7200000", None))
            .expect("kept");

        assert_eq!(record.job_type, JobType::Cpu);
        assert_eq!(record.energy_kwh, 2.0);
    }

    #[test]
    fn custom_gpu_marker() {
        let normalizer = Normalizer::new("gpu=", UtcOffset::UTC);
        let record = normalizer
            .normalize_row(row(
                "2024-09-16T10:15:00",
                "2024-09-16T11:00:00",
                "1",
                Some("cpu=8,gpu=2"),
            ))
            .expect("kept");

        assert_eq!(record.job_type, JobType::Gpu);
    }

    #[test]
    fn naive_start_uses_configured_offset() {
        let normalizer = Normalizer::new(DEFAULT_GPU_MARKER, offset!(-7));
        let record = normalizer
            .normalize_row(row("2024-09-16T10:15:00", "2024-09-16T11:00:00", "1", None))
            .expect("kept");

        assert_eq!(record.start, datetime!(2024-09-16 17:15:00 UTC));
        assert_eq!(record.start_hour_utc, datetime!(2024-09-16 17:00:00 UTC));
    }

    #[test]
    fn rows_are_dropped_with_reasons() {
        let n = Normalizer::default();
        let cases = [
            (row("", "2024-09-16T11:00:00", "10", None), DropReason::MissingStart),
            (row("Unknown", "2024-09-16T11:00:00", "10", None), DropReason::InvalidStart),
            (row("2024-09-16T10:00:00", "", "10", None), DropReason::MissingEnd),
            (row("2024-09-16T10:00:00", "None", "10", None), DropReason::InvalidEnd),
            (row("2024-09-16T10:00:00", "2024-09-16T11:00:00", "", None), DropReason::MissingEnergy),
            (row("2024-09-16T10:00:00", "2024-09-16T11:00:00", "12J", None), DropReason::InvalidEnergy),
            (row("2024-09-16T10:00:00", "2024-09-16T11:00:00", "0", None), DropReason::NonPositiveEnergy),
            (row("2024-09-16T10:00:00", "2024-09-16T11:00:00", "-5", None), DropReason::NonPositiveEnergy),
        ];

        for (input, expected) in cases {
            assert_eq!(n.normalize_row(input), Err(expected));
        }
    }

    #[test]
    fn normalize_partitions_every_row() {
        let mut rows = vec![
            row("2024-09-16T10:15:00", "2024-09-16T11:00:00", "3600000", None),
            row("Unknown", "2024-09-16T11:00:00", "3600000", None),
            row("2024-09-16T12:15:00", "2024-09-16T13:00:00", "0", None),
        ];
        for (i, r) in rows.iter_mut().enumerate() {
            r.line = i as u64 + 2;
        }

        let out = Normalizer::default().normalize(rows);

        assert_eq!(out.kept.len(), 1);
        assert_eq!(
            out.dropped,
            vec![
                DroppedRow { line: 3, reason: DropReason::InvalidStart },
                DroppedRow { line: 4, reason: DropReason::NonPositiveEnergy },
            ]
        );
        assert_eq!(out.drop_counts().get(&DropReason::InvalidStart), Some(&1));
    }
}
