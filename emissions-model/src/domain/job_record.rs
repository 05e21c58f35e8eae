use std::fmt;

use time::OffsetDateTime;

/// Joules per kilowatt-hour.
pub const JOULES_PER_KWH: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum JobType {
    Cpu,
    Gpu,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Cpu => "CPU",
            JobType::Gpu => "GPU",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized accounting entry.
///
/// `start` and `end` are always UTC. `start_hour_utc` is `start` floored to
/// the hour and is the key used to look up carbon intensity.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub user: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub consumed_energy_raw: u64,
    pub alloc_resources: Option<String>,
    pub energy_kwh: f64,
    pub job_key: String,
    pub job_type: JobType,
    pub start_hour_utc: OffsetDateTime,
}

impl JobRecord {
    pub fn is_gpu_job(&self) -> bool {
        self.job_type == JobType::Gpu
    }
}

/// Converts a raw energy reading (Joules) to kWh.
pub fn energy_kwh(consumed_energy_raw: u64) -> f64 {
    consumed_energy_raw as f64 / JOULES_PER_KWH
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn energy_conversion_is_exact_division() {
        assert_eq!(energy_kwh(3_600_000), 1.0);
        assert_eq!(energy_kwh(1_800_000), 0.5);
        assert_eq!(energy_kwh(1), 1.0 / 3_600_000.0);
    }

    #[test]
    fn job_type_labels() {
        assert_eq!(JobType::Gpu.to_string(), "GPU");
        assert_eq!(JobType::Cpu.as_str(), "CPU");
    }
}
