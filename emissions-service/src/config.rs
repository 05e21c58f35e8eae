use serde::Deserialize;
use std::fs;

use emissions_model::timestamp::parse_offset;
use time::{Duration, UtcOffset};

use crate::{
    fetch::FetcherConfig,
    pipeline::PipelineError,
    sources::carbon_intensity_http::DEFAULT_BASE_URL,
    transform::normalize::DEFAULT_GPU_MARKER,
};

pub const CONFIG_PATH_ENV: &str = "EMISSIONS_CONFIG";
pub const TOKEN_ENV: &str = "ELECTRICITY_MAPS_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct AccountingConfig {
    pub path: String,
    #[serde(default = "default_accounting_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_gpu_marker")]
    pub gpu_marker: String,
    /// Offset assumed for timestamps that carry none.
    #[serde(default = "default_naive_utc_offset")]
    pub naive_utc_offset: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarbonIntensityConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub zone: String,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_max_chunk_days")]
    pub max_chunk_days: i64,
    #[serde(default = "default_span_margin_hours")]
    pub span_margin_hours: i64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default = "default_output_delimiter")]
    pub delimiter: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            delimiter: default_output_delimiter(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus exposition text is written here at the end of a run.
    pub textfile_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub accounting: AccountingConfig,
    pub carbon_intensity: CarbonIntensityConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_accounting_delimiter() -> String {
    "|".to_string()
}

fn default_gpu_marker() -> String {
    DEFAULT_GPU_MARKER.to_string()
}

fn default_naive_utc_offset() -> String {
    "+00:00".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_max_chunk_days() -> i64 {
    10
}

fn default_span_margin_hours() -> i64 {
    1
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent_requests() -> usize {
    1
}

fn default_output_path() -> String {
    "job_emissions_output.csv".to_string()
}

fn default_output_delimiter() -> String {
    ",".to_string()
}

fn single_byte_delimiter(field: &str, value: &str) -> Result<u8, PipelineError> {
    let unescaped = if value == "\\t" { "\t" } else { value };
    match unescaped.as_bytes() {
        [b] => Ok(*b),
        _ => Err(PipelineError::Config(format!(
            "{field} must be a single ASCII character, got '{value}'"
        ))),
    }
}

impl AccountingConfig {
    pub fn delimiter(&self) -> Result<u8, PipelineError> {
        single_byte_delimiter("accounting.delimiter", &self.delimiter)
    }

    pub fn naive_offset(&self) -> Result<UtcOffset, PipelineError> {
        parse_offset(&self.naive_utc_offset).map_err(|_| {
            PipelineError::Config(format!(
                "accounting.naive_utc_offset must look like '+00:00', got '{}'",
                self.naive_utc_offset
            ))
        })
    }
}

impl CarbonIntensityConfig {
    /// Token from `ELECTRICITY_MAPS_TOKEN` if set, otherwise from the file.
    pub fn auth_token(&self) -> Result<String, PipelineError> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.auth_token.clone())
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "carbon_intensity.auth_token is not set and {TOKEN_ENV} is empty"
                ))
            })
    }

    pub fn max_chunk(&self) -> Result<Duration, PipelineError> {
        if self.max_chunk_days <= 0 {
            return Err(PipelineError::Config(format!(
                "carbon_intensity.max_chunk_days must be positive, got {}",
                self.max_chunk_days
            )));
        }
        self.max_chunk_days
            .checked_mul(86_400)
            .map(Duration::seconds)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "carbon_intensity.max_chunk_days is out of range, got {}",
                    self.max_chunk_days
                ))
            })
    }

    pub fn span_margin(&self) -> Result<Duration, PipelineError> {
        if self.span_margin_hours < 0 {
            return Err(PipelineError::Config(format!(
                "carbon_intensity.span_margin_hours must not be negative, got {}",
                self.span_margin_hours
            )));
        }
        self.span_margin_hours
            .checked_mul(3_600)
            .map(Duration::seconds)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "carbon_intensity.span_margin_hours is out of range, got {}",
                    self.span_margin_hours
                ))
            })
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.request_timeout_ms)
    }

    pub fn fetcher_config(&self) -> Result<FetcherConfig, PipelineError> {
        if self.zone.trim().is_empty() {
            return Err(PipelineError::Config("carbon_intensity.zone must not be empty".to_string()));
        }
        Ok(FetcherConfig {
            zone: self.zone.trim().to_string(),
            max_chunk: self.max_chunk()?,
            max_concurrent_requests: self.max_concurrent_requests.max(1),
        })
    }
}

impl OutputConfig {
    pub fn delimiter(&self) -> Result<u8, PipelineError> {
        single_byte_delimiter("output.delimiter", &self.delimiter)
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "emissions-config.toml".to_string());
        let contents = fs::read_to_string(&path)?;
        let cfg = Self::from_toml_str(&contents)?;
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }
}
