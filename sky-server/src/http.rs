// sky-server/src/http.rs
use reqwest::{Client, Response};
use sky_common::SkyError;
use std::time::Duration;

use crate::config::ServicesConfig;

/// Shared outbound client. Nominatim rejects requests without a User-Agent.
pub fn build_client(services: &ServicesConfig) -> Result<Client, SkyError> {
    Client::builder()
        .user_agent(services.user_agent.clone())
        .timeout(Duration::from_secs(services.timeout_secs.max(1)))
        .build()
        .upstream("building HTTP client")
}

pub trait UpstreamExt<T> {
    fn upstream(self, what: &str) -> Result<T, SkyError>;
}

impl<T> UpstreamExt<T> for Result<T, reqwest::Error> {
    fn upstream(self, what: &str) -> Result<T, SkyError> {
        self.map_err(|e| SkyError::upstream(format!("{}: {}", what, e)))
    }
}

/// Passes successful responses through; turns error statuses into `Upstream`
/// errors carrying the start of the body (OpenWeatherMap explains itself there).
pub async fn check_status(response: Response, what: &str) -> Result<Response, SkyError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    Err(SkyError::upstream(format!("{} returned {}: {}", what, status, body.trim())))
}
