pub mod accounting_log;
pub mod carbon_intensity_http;

pub use accounting_log::AccountingLogSource;
pub use carbon_intensity_http::ElectricityMapsClient;
