// sky-server/src/plugins/openweather/operations.rs
use reqwest::Client;
use serde_json::Value;
use sky_common::{Coordinate, SkyError};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::http::{check_status, UpstreamExt};

/// Unit systems OpenWeatherMap understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    Metric,
    Imperial,
    Standard,
}

impl Units {
    pub const ALL: [&'static str; 3] = ["metric", "imperial", "standard"];

    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = SkyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "standard" => Ok(Units::Standard),
            other => Err(SkyError::invalid(format!(
                "units must be one of {}, got '{}'",
                Units::ALL.join(", "),
                other
            ))),
        }
    }
}

/// OpenWeatherMap 2.5 API client.
pub struct OpenWeather {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenWeather {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        OpenWeather {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn get(&self, endpoint: &str, coord: &Coordinate, extra: &[(&str, &str)]) -> Result<Value, SkyError> {
        let lat = coord.latitude.to_string();
        let lon = coord.longitude.to_string();
        let mut query = vec![("lat", lat.as_str()), ("lon", lon.as_str()), ("appid", self.api_key.as_str())];
        query.extend_from_slice(extra);

        let response = self
            .http
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(&query)
            .send()
            .await
            .upstream("OpenWeatherMap request")?;
        check_status(response, "OpenWeatherMap")
            .await?
            .json()
            .await
            .upstream("OpenWeatherMap response")
    }

    /// Current conditions, passed through as OpenWeatherMap sends them.
    pub async fn current(&self, coord: &Coordinate, units: Units) -> Result<Value, SkyError> {
        info!("Current weather at {} ({})", coord, units);
        self.get("weather", coord, &[("units", units.as_str())]).await
    }

    pub async fn uv_index(&self, coord: &Coordinate) -> Result<f64, SkyError> {
        info!("UV index at {}", coord);
        let body = self.get("uvi", coord, &[]).await?;
        body.get("value")
            .and_then(Value::as_f64)
            .ok_or_else(|| SkyError::parse("UV index response has no 'value'"))
    }
}
