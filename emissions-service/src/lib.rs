pub mod aggregate;
pub mod config;
pub mod fetch;
pub mod metrics_export;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{EmissionsPipeline, RunReport, RunStatus};
