// sky-server/src/plugins/metar/plugin.rs
use chrono::Utc;
use serde_json::{json, Value};
use sky_common::plugin::{coordinate_arg, coordinate_properties, operation_schema, optional_f64, required_str, ResourceEntry, ResourceFuture};
use sky_common::{PluginFuture, SkyError, SkyPlugin, ToolAnnotations};
use std::sync::Arc;
use tracing::info;

use super::operations::{normalize_code, DEFAULT_MAX_AGE_SECS, DEFAULT_RADIUS_KM};
use super::MetarService;

const MAX_CODE_COMPLETIONS: usize = 20;

/// `metar(code)`: latest report of one station. Also serves `metar:<CODE>` fragments.
pub struct MetarPlugin {
    metar: Arc<MetarService>,
}

impl MetarPlugin {
    pub fn new(metar: Arc<MetarService>) -> Self {
        MetarPlugin { metar }
    }
}

impl SkyPlugin for MetarPlugin {
    fn name(&self) -> &str {
        "metar"
    }

    fn description(&self) -> &str {
        "Fetch the latest METAR weather report for an ICAO station code such as LOWG"
    }

    fn category(&self) -> &str {
        "weather"
    }

    fn supported_operations(&self) -> Vec<String> {
        vec!["GET".to_string()]
    }

    fn input_schema(&self) -> Value {
        operation_schema(
            &self.supported_operations(),
            json!({
                "code": { "type": "string", "description": "Four-letter ICAO station code, e.g. LOWG" }
            }),
            &["code"],
        )
    }

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        Some(ToolAnnotations::read_only("METAR report"))
    }

    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
        Box::pin(async move {
            if operation != "GET" {
                return Err(SkyError::Unsupported(operation.to_string()));
            }
            let report = self.metar.fetch(required_str(params, "code")?).await?;
            Ok(json!({
                "station": report.station,
                "observed": report.observed.to_rfc3339(),
                "age_minutes": report.age_minutes(Utc::now()),
                "report": report.report,
            }))
        })
    }

    fn resources(&self) -> Vec<ResourceEntry> {
        vec![ResourceEntry {
            name: "METAR station catalogue".to_string(),
            suffix: "catalog".to_string(),
            description: Some(format!("Stations known to metar_nearby ({})", self.metar.catalog().source_url())),
            mime_type: "text/plain",
        }]
    }

    fn resource_templates(&self) -> Vec<ResourceEntry> {
        vec![ResourceEntry {
            name: "METAR report".to_string(),
            suffix: "{code}".to_string(),
            description: Some(format!(
                "Latest report as a one-line fragment, e.g. metar/LOWG (source {})",
                self.metar.source_url("{code}")
            )),
            mime_type: "text/plain",
        }]
    }

    fn read_resource<'a>(&'a self, suffix: &'a str) -> ResourceFuture<'a> {
        Box::pin(async move {
            if suffix.eq_ignore_ascii_case("catalog") {
                let stations = self.metar.catalog().get().await?;
                return Ok(format!("{} METAR stations from {}", stations.len(), self.metar.catalog().source_url()));
            }
            let code = normalize_code(suffix)?;
            info!("Loading METAR fragment for {}", code);
            let report = self.metar.fetch(&code).await?;
            Ok(report.fragment(Utc::now()))
        })
    }

    fn completions(&self, param_name: &str, partial_value: &str) -> Vec<String> {
        if param_name != "code" {
            return Vec::new();
        }
        let Some(stations) = self.metar.catalog().loaded() else {
            return Vec::new();
        };
        let prefix = partial_value.trim().to_uppercase();
        stations
            .iter()
            .filter(|s| s.code.starts_with(&prefix))
            .map(|s| s.code.clone())
            .take(MAX_CODE_COMPLETIONS)
            .collect()
    }
}

/// `metar_nearby(latitude, longitude, max_distance, max_seconds_ago)`.
pub struct MetarNearbyPlugin {
    metar: Arc<MetarService>,
}

impl MetarNearbyPlugin {
    pub fn new(metar: Arc<MetarService>) -> Self {
        MetarNearbyPlugin { metar }
    }
}

impl SkyPlugin for MetarNearbyPlugin {
    fn name(&self) -> &str {
        "metar_nearby"
    }

    fn description(&self) -> &str {
        "METAR reports from stations near a location, closest first"
    }

    fn category(&self) -> &str {
        "weather"
    }

    fn supported_operations(&self) -> Vec<String> {
        vec!["GET".to_string()]
    }

    fn input_schema(&self) -> Value {
        let mut properties = coordinate_properties();
        if let Some(props) = properties.as_object_mut() {
            props.insert(
                "max_distance".to_string(),
                json!({ "type": "number", "description": "Search radius in km", "default": DEFAULT_RADIUS_KM }),
            );
            props.insert(
                "max_seconds_ago".to_string(),
                json!({ "type": "integer", "description": "Ignore reports older than this", "default": DEFAULT_MAX_AGE_SECS }),
            );
        }
        operation_schema(&self.supported_operations(), properties, &["latitude", "longitude"])
    }

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        Some(ToolAnnotations::read_only("Nearby METAR reports"))
    }

    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
        Box::pin(async move {
            if operation != "GET" {
                return Err(SkyError::Unsupported(operation.to_string()));
            }
            let origin = coordinate_arg(params)?;
            let radius = optional_f64(params, "max_distance")?.unwrap_or(DEFAULT_RADIUS_KM);
            let max_age = optional_f64(params, "max_seconds_ago")?.map(|s| s as i64).unwrap_or(DEFAULT_MAX_AGE_SECS);
            let reports = self.metar.nearby(origin, radius, max_age, Utc::now()).await?;
            Ok(serde_json::to_value(reports)?)
        })
    }
}
