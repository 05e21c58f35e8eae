use emissions_model::domain::{JobRecord, TimeSpan};
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::pipeline::PipelineError;

pub const DEFAULT_SPAN_MARGIN: Duration = Duration::HOUR;

/// Converts `ts` to UTC and truncates it to the start of its hour.
pub fn floor_to_hour(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc - Duration::minutes(utc.minute().into())
        - Duration::seconds(utc.second().into())
        - Duration::nanoseconds(utc.nanosecond().into())
}

/// Span of bucketed start hours, widened by `margin` on both sides.
///
/// Fails with [`PipelineError::EmptyInput`] when `records` is empty.
pub fn required_span(records: &[JobRecord], margin: Duration) -> Result<TimeSpan, PipelineError> {
    let hours = records.iter().map(|r| r.start_hour_utc);
    let min = hours.clone().min().ok_or(PipelineError::EmptyInput)?;
    let max = hours.max().ok_or(PipelineError::EmptyInput)?;

    let start = min.checked_sub(margin);
    let end = max.checked_add(margin);
    match (start, end) {
        (Some(start), Some(end)) => Ok(TimeSpan::new(start, end)),
        _ => Err(PipelineError::Config(format!(
            "span margin {margin} takes the fetch range out of bounds"
        ))),
    }
}
