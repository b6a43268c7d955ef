// sky-server/src/plugins/metar/operations.rs
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::Serialize;
use sky_common::geo::compass_point;
use sky_common::metar::{MetarReport, Station};
use sky_common::{Coordinate, SkyError};
use std::sync::Arc;
use tracing::{debug, info};

use super::StationCatalog;
use crate::http::{check_status, UpstreamExt};

pub const DEFAULT_RADIUS_KM: f64 = 100.0;
pub const DEFAULT_MAX_AGE_SECS: i64 = 7200;
/// Upper bound on station files fetched for one nearby query
pub const MAX_NEARBY_STATIONS: usize = 40;
const CONCURRENT_FETCHES: usize = 8;

/// One entry of a nearby-stations answer.
#[derive(Debug, Clone, Serialize)]
pub struct NearbyReport {
    pub station: String,
    pub name: String,
    pub distance_km: f64,
    pub bearing: f64,
    pub compass: &'static str,
    pub age_minutes: i64,
    pub report: String,
    /// `"<name>: <km>km <compass> <m>m ago"`
    pub summary: String,
}

pub struct MetarService {
    http: Client,
    base_url: String,
    catalog: Arc<StationCatalog>,
}

/// ICAO codes are four letters or digits; anything else never reaches the URL.
pub fn normalize_code(code: &str) -> Result<String, SkyError> {
    let code = code.trim().to_uppercase();
    if code.len() == 4 && code.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(code)
    } else {
        Err(SkyError::invalid(format!("'{}' is not a four-character ICAO station code", code)))
    }
}

impl MetarService {
    pub fn new(http: Client, base_url: &str, catalog: Arc<StationCatalog>) -> Self {
        MetarService { http, base_url: base_url.trim_end_matches('/').to_string(), catalog }
    }

    pub fn catalog(&self) -> &Arc<StationCatalog> {
        &self.catalog
    }

    pub fn source_url(&self, code: &str) -> String {
        format!("{}/{}.TXT", self.base_url, code.to_uppercase())
    }

    /// Latest report for a station.
    pub async fn fetch(&self, code: &str) -> Result<MetarReport, SkyError> {
        let code = normalize_code(code)?;
        let response = self.http.get(self.source_url(&code)).send().await.upstream("METAR request")?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SkyError::NotFound(format!("no METAR published for station {}", code)));
        }
        let text = check_status(response, "METAR server").await?.text().await.upstream("METAR body")?;
        MetarReport::parse(&code, &text)
    }

    /// Reports from stations within `max_distance_km`, closest first. Stations
    /// that fail to answer or whose report is older than `max_age_secs` are left out.
    pub async fn nearby(
        &self,
        origin: Coordinate,
        max_distance_km: f64,
        max_age_secs: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<NearbyReport>, SkyError> {
        if !(max_distance_km > 0.0) {
            return Err(SkyError::invalid("max_distance must be positive"));
        }
        let stations = self.catalog.get().await?;
        let candidates = stations_within(&stations, &origin, max_distance_km);
        info!("{} stations within {}km of {}", candidates.len(), max_distance_km, origin);

        let reports: Vec<NearbyReport> = stream::iter(candidates)
            .map(|(station, distance)| async move {
                let result = self.fetch(&station.code).await;
                (station, distance, result)
            })
            .buffered(CONCURRENT_FETCHES)
            .filter_map(|(station, distance, result)| async move {
                match result {
                    Ok(report) if (now - report.observed).num_seconds() <= max_age_secs => {
                        Some(nearby_entry(&origin, station, distance, report, now))
                    }
                    Ok(report) => {
                        debug!("Skipping {}: report from {} is too old", station.code, report.observed);
                        None
                    }
                    Err(e) => {
                        debug!("Skipping {}: {}", station.code, e);
                        None
                    }
                }
            })
            .collect()
            .await;

        Ok(reports)
    }
}

/// Stations within range sorted by distance, capped at `MAX_NEARBY_STATIONS`.
fn stations_within(stations: &[Station], origin: &Coordinate, max_distance_km: f64) -> Vec<(Station, f64)> {
    let mut within: Vec<(Station, f64)> = stations
        .iter()
        .map(|s| (s, origin.distance_km(&s.coordinate)))
        .filter(|(_, d)| *d <= max_distance_km)
        .map(|(s, d)| (s.clone(), d))
        .collect();
    within.sort_by(|a, b| a.1.total_cmp(&b.1));
    within.truncate(MAX_NEARBY_STATIONS);
    within
}

fn nearby_entry(origin: &Coordinate, station: Station, distance: f64, report: MetarReport, now: DateTime<Utc>) -> NearbyReport {
    let bearing = origin.bearing_to(&station.coordinate);
    let compass = compass_point(bearing);
    let age_minutes = report.age_minutes(now).abs();
    NearbyReport {
        summary: format!("{}: {}km {} {}m ago", station.name, distance.round(), compass, age_minutes),
        station: station.code,
        name: station.name,
        distance_km: (distance * 10.0).round() / 10.0,
        bearing: bearing.round(),
        compass,
        age_minutes,
        report: report.report,
    }
}
