use emissions_model::domain::{AggregateSummary, CarbonIntensitySeries, JobRecord, JoinedRecord};

/// Left join of `records` against `series` on `start_hour_utc == datetime`.
///
/// Produces exactly one `JoinedRecord` per input record, in input order.
pub fn join(records: &[JobRecord], series: &CarbonIntensitySeries) -> Vec<JoinedRecord> {
    let joined: Vec<JoinedRecord> = records
        .iter()
        .map(|job| JoinedRecord::new(job.clone(), series.lookup(job.start_hour_utc)))
        .collect();

    let unmatched = joined.iter().filter(|j| !j.is_matched()).count();
    if unmatched > 0 {
        metrics::counter!("joined_records_unmatched_total").increment(unmatched as u64);
    }

    joined
}

pub fn summarize(joined: &[JoinedRecord]) -> AggregateSummary {
    let mut summary = AggregateSummary {
        total_jobs: joined.len(),
        ..AggregateSummary::empty()
    };
    let mut matched_energy = 0.0;
    let mut weighted_ci = 0.0;

    for record in joined {
        let job = &record.job;
        let per_type = summary.by_job_type.entry(job.job_type).or_default();
        per_type.jobs += 1;
        per_type.energy_kwh += job.energy_kwh;
        summary.total_energy_kwh += job.energy_kwh;

        if let (Some(ci), Some(emissions)) = (record.ci_g_per_kwh, record.emissions_kg) {
            summary.matched_jobs += 1;
            summary.total_emissions_kg += emissions;
            per_type.matched += 1;
            per_type.emissions_kg += emissions;
            matched_energy += job.energy_kwh;
            weighted_ci += job.energy_kwh * ci;
        }
    }

    summary.unmatched_jobs = summary.total_jobs - summary.matched_jobs;
    summary.weighted_avg_ci = if summary.matched_jobs > 0 && matched_energy > 0.0 {
        weighted_ci / matched_energy
    } else {
        0.0
    };

    summary
}
