// sky-server/src/plugins/geocode/operations.rs
use reqwest::Client;
use serde_json::Value;
use sky_common::plugin::optional_f64;
use sky_common::{Coordinate, SkyError};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::http::{check_status, UpstreamExt};

/// Most distinct queries kept in memory
const CACHE_CAPACITY: usize = 512;

/// Place name lookups against a Nominatim instance.
pub struct Geocoder {
    http: Client,
    base_url: String,
    cache: RwLock<HashMap<String, (Instant, Value)>>,
    capacity: usize,
}

impl Geocoder {
    pub fn new(http: Client, base_url: &str) -> Self {
        Geocoder {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: RwLock::new(HashMap::new()),
            capacity: CACHE_CAPACITY,
        }
    }

    /// Best match for `query` as Nominatim returns it.
    pub async fn search(&self, query: &str) -> Result<Value, SkyError> {
        let key = query.trim().to_lowercase();
        if let Some((_, hit)) = self.cache.read().await.get(&key) {
            debug!("Geocode cache hit for '{}'", key);
            return Ok(hit.clone());
        }

        info!("Geocoding '{}'", query);
        let response = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query.trim()), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .upstream("Nominatim request")?;
        let results: Value = check_status(response, "Nominatim")
            .await?
            .json()
            .await
            .upstream("Nominatim response")?;

        let first = results
            .as_array()
            .and_then(|matches| matches.first())
            .cloned()
            .ok_or_else(|| SkyError::NotFound(format!("'{}' not found", query.trim())))?;

        let mut cache = self.cache.write().await;
        if cache.len() >= self.capacity && !cache.contains_key(&key) {
            let oldest = cache.iter().min_by_key(|(_, (at, _))| *at).map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("Geocode cache full, evicting '{}'", oldest);
                cache.remove(&oldest);
            }
        }
        cache.insert(key, (Instant::now(), first.clone()));
        Ok(first)
    }

    pub async fn locate(&self, query: &str) -> Result<Coordinate, SkyError> {
        let place = self.search(query).await?;
        // Nominatim sends coordinates as strings
        let latitude = optional_f64(&place, "lat")?;
        let longitude = optional_f64(&place, "lon")?;
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Coordinate::new(lat, lon),
            _ => Err(SkyError::parse(format!("geocoding result for '{}' has no coordinates", query.trim()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn graz() -> Value {
        json!([{
            "place_id": 104185,
            "lat": "47.0708678",
            "lon": "15.4382786",
            "display_name": "Graz, Steiermark, Österreich",
            "type": "city"
        }])
    }

    #[tokio::test]
    async fn finds_a_place_and_caches_it() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Graz"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(graz()))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = Geocoder::new(Client::new(), &server.uri());
        let place = geocoder.search("Graz").await.unwrap();
        assert_eq!(place["display_name"], json!("Graz, Steiermark, Österreich"));

        let coord = geocoder.locate(" graz ").await.unwrap();
        assert!((coord.latitude - 47.0708678).abs() < 1e-9);
        assert!((coord.longitude - 15.4382786).abs() < 1e-9);
    }

    #[tokio::test]
    async fn cache_evicts_the_oldest_query_when_full() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(graz()))
            .expect(4)
            .mount(&server)
            .await;

        let mut geocoder = Geocoder::new(Client::new(), &server.uri());
        geocoder.capacity = 2;
        geocoder.search("Graz").await.unwrap();
        geocoder.search("Leoben").await.unwrap();
        geocoder.search("Bruck").await.unwrap();
        assert_eq!(geocoder.cache.read().await.len(), 2);
        assert!(!geocoder.cache.read().await.contains_key("graz"));

        // Still cached, no request
        geocoder.search("Bruck").await.unwrap();
        // Evicted, fetched again
        geocoder.search("Graz").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_place_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let geocoder = Geocoder::new(Client::new(), &server.uri());
        let err = geocoder.locate("Atlantis").await.unwrap_err();
        assert!(matches!(err, SkyError::NotFound(_)));
        assert_eq!(err.to_string(), "'Atlantis' not found");
    }

    #[tokio::test]
    async fn error_status_is_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Access blocked"))
            .mount(&server)
            .await;

        let geocoder = Geocoder::new(Client::new(), &server.uri());
        let err = geocoder.search("Graz").await.unwrap_err();
        assert!(matches!(err, SkyError::Upstream(ref m) if m.contains("403") && m.contains("Access blocked")));
    }
}
