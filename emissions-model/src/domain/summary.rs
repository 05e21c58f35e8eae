use std::{collections::BTreeMap, fmt};

use crate::domain::JobType;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobTypeTotals {
    pub jobs: usize,
    pub matched: usize,
    pub energy_kwh: f64,
    pub emissions_kg: f64,
}

/// Dataset-level figures for one run.
///
/// `weighted_avg_ci` is the energy-weighted mean intensity over matched
/// records, and 0 when nothing matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSummary {
    pub total_jobs: usize,
    pub matched_jobs: usize,
    pub unmatched_jobs: usize,
    pub total_energy_kwh: f64,
    pub total_emissions_kg: f64,
    pub weighted_avg_ci: f64,
    pub by_job_type: BTreeMap<JobType, JobTypeTotals>,
}

impl AggregateSummary {
    /// Summary for a run that produced no emissions figures.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn match_ratio(&self) -> f64 {
        if self.total_jobs == 0 {
            0.0
        } else {
            self.matched_jobs as f64 / self.total_jobs as f64
        }
    }
}

impl fmt::Display for AggregateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "SUMMARY:")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Total jobs: {}", self.total_jobs)?;
        writeln!(f, "Jobs with emissions data: {}", self.matched_jobs)?;
        writeln!(f, "Jobs without emissions data: {}", self.unmatched_jobs)?;
        writeln!(f, "Total energy consumed: {:.2} kWh", self.total_energy_kwh)?;
        writeln!(f, "Total emissions: {:.3} kg CO2e", self.total_emissions_kg)?;
        writeln!(f, "Weighted average CI: {:.1} g CO2e/kWh", self.weighted_avg_ci)?;
        for (job_type, totals) in &self.by_job_type {
            writeln!(
                f,
                "  {job_type}: {} jobs ({} matched), {:.2} kWh, {:.3} kg CO2e",
                totals.jobs, totals.matched, totals.energy_kwh, totals.emissions_kg
            )?;
        }
        write!(f, "{rule}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_reports_zero() {
        let s = AggregateSummary::empty();
        assert_eq!(s.match_ratio(), 0.0);
        assert_eq!(s.weighted_avg_ci, 0.0);

        let text = s.to_string();
        assert!(text.contains("Total jobs: 0"));
        assert!(text.contains("Total emissions: 0.000 kg CO2e"));
    }

    #[test]
    fn display_includes_job_type_breakdown() {
        let mut s = AggregateSummary {
            total_jobs: 4,
            matched_jobs: 3,
            unmatched_jobs: 1,
            total_energy_kwh: 2.0,
            total_emissions_kg: 0.5,
            weighted_avg_ci: 250.0,
            by_job_type: BTreeMap::new(),
        };
        s.by_job_type.insert(
            JobType::Gpu,
            JobTypeTotals {
                jobs: 1,
                matched: 1,
                energy_kwh: 1.0,
                emissions_kg: 0.25,
            },
        );

        assert_eq!(s.match_ratio(), 0.75);
        let text = s.to_string();
        assert!(text.contains("Weighted average CI: 250.0 g CO2e/kWh"));
        assert!(text.contains("GPU: 1 jobs (1 matched), 1.00 kWh, 0.250 kg CO2e"));
    }
}
