use std::time::Duration;

use emissions_model::domain::{CarbonIntensitySample, TimeSpan};
use reqwest::Client;
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::fetch::{CarbonIntensityApi, FetchError};

pub const DEFAULT_BASE_URL: &str = "https://api.electricitymaps.com";
const PAST_RANGE_PATH: &str = "/v3/carbon-intensity/past-range";
const AUTH_HEADER: &str = "auth-token";

/// Client for the Electricity Maps `carbon-intensity/past-range` endpoint.
#[derive(Clone)]
pub struct ElectricityMapsClient {
    http: Client,
    base_url: String,
    auth_token: String,
}

#[derive(Deserialize)]
struct PastRangeResponse {
    data: Vec<PastRangeEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PastRangeEntry {
    #[serde(with = "time::serde::rfc3339")]
    datetime: OffsetDateTime,
    carbon_intensity: Option<f64>,
}

impl ElectricityMapsClient {
    pub fn new(base_url: &str, auth_token: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
        })
    }
}

/// Decodes a past-range body. Entries without a usable intensity are
/// skipped.
fn decode_past_range(body: &str) -> Result<Vec<CarbonIntensitySample>, FetchError> {
    let parsed: PastRangeResponse = serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    Ok(parsed
        .data
        .into_iter()
        .filter_map(|entry| {
            let ci = entry.carbon_intensity.filter(|v| v.is_finite() && *v >= 0.0)?;
            Some(CarbonIntensitySample {
                datetime: entry.datetime.to_offset(time::UtcOffset::UTC),
                ci_g_per_kwh: ci,
            })
        })
        .collect())
}

#[async_trait::async_trait]
impl CarbonIntensityApi for ElectricityMapsClient {
    async fn fetch_range(&self, zone: &str, range: TimeSpan) -> Result<Vec<CarbonIntensitySample>, FetchError> {
        let url = format!("{}{PAST_RANGE_PATH}", self.base_url);
        let start = range.start.format(&Rfc3339)?;
        let end = range.end.format(&Rfc3339)?;

        let response = self
            .http
            .get(url)
            .query(&[("zone", zone), ("start", start.as_str()), ("end", end.as_str())])
            .header(AUTH_HEADER, &self.auth_token)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        decode_past_range(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn decodes_provider_payload() {
        let body = r#"{
            "zone": "US-CAL-CISO",
            "data": [
                {"zone": "US-CAL-CISO", "carbonIntensity": 250, "datetime": "2024-09-16T10:00:00.000Z", "isEstimated": false},
                {"zone": "US-CAL-CISO", "carbonIntensity": 262.5, "datetime": "2024-09-16T11:00:00.000Z"},
                {"zone": "US-CAL-CISO", "carbonIntensity": null, "datetime": "2024-09-16T12:00:00.000Z"}
            ]
        }"#;

        let samples = decode_past_range(body).expect("samples");

        assert_eq!(
            samples,
            vec![
                CarbonIntensitySample {
                    datetime: datetime!(2024-09-16 10:00:00 UTC),
                    ci_g_per_kwh: 250.0,
                },
                CarbonIntensitySample {
                    datetime: datetime!(2024-09-16 11:00:00 UTC),
                    ci_g_per_kwh: 262.5,
                },
            ]
        );
    }

    #[test]
    fn offset_datetimes_are_normalized_to_utc() {
        let body = r#"{"data": [{"carbonIntensity": 100, "datetime": "2024-09-16T12:00:00+02:00"}]}"#;

        let samples = decode_past_range(body).expect("samples");

        assert_eq!(samples[0].datetime, datetime!(2024-09-16 10:00:00 UTC));
        assert_eq!(samples[0].datetime.offset(), time::UtcOffset::UTC);
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        assert!(matches!(decode_past_range("{\"error\": 1}"), Err(FetchError::Decode(_))));
        assert!(matches!(decode_past_range("not json"), Err(FetchError::Decode(_))));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ElectricityMapsClient::new("http://localhost:9/", "token", Duration::from_secs(1)).expect("client");
        assert_eq!(client.base_url, "http://localhost:9");
    }
}
