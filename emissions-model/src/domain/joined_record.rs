use crate::domain::JobRecord;

/// A `JobRecord` annotated with the carbon intensity of its start hour.
///
/// `emissions_kg` is `None` exactly when `ci_g_per_kwh` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedRecord {
    pub job: JobRecord,
    pub ci_g_per_kwh: Option<f64>,
    pub emissions_kg: Option<f64>,
}

impl JoinedRecord {
    pub fn new(job: JobRecord, ci_g_per_kwh: Option<f64>) -> Self {
        let emissions_kg = ci_g_per_kwh.map(|ci| job.energy_kwh * ci / 1000.0);
        Self {
            job,
            ci_g_per_kwh,
            emissions_kg,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.ci_g_per_kwh.is_some()
    }
}
