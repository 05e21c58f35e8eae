pub mod carbon_intensity;
pub mod job_record;
pub mod joined_record;
pub mod summary;
pub mod time_span;

pub use carbon_intensity::{CarbonIntensitySample, CarbonIntensitySeries};
pub use job_record::{JobRecord, JobType};
pub use joined_record::JoinedRecord;
pub use summary::{AggregateSummary, JobTypeTotals};
pub use time_span::TimeSpan;
