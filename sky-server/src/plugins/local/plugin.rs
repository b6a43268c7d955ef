// sky-server/src/plugins/local/plugin.rs
use chrono::Utc;
use serde_json::{json, Value};
use sky_common::plugin::{coordinate_arg, operation_schema, optional_f64};
use sky_common::{Coordinate, PluginFuture, PluginResult, SkyError, SkyPlugin, ToolAnnotations};
use std::sync::Arc;
use tracing::info;

use crate::plugins::astro;
use crate::plugins::geocode::Geocoder;
use crate::plugins::metar::{MetarService, DEFAULT_MAX_AGE_SECS, DEFAULT_RADIUS_KM};
use crate::plugins::openweather::{units_arg, units_property, OpenWeather};

const BASE_OPERATIONS: [&str; 4] = ["COORDINATES", "MOON", "METAR", "SUN"];
const WEATHER_OPERATIONS: [&str; 2] = ["WEATHER", "UV_INDEX"];

/// Location-bound toolbox: resolves the place once per call and hands the
/// coordinate to the other tools.
pub struct LocalPlugin {
    geocoder: Arc<Geocoder>,
    metar: Arc<MetarService>,
    weather: Option<Arc<OpenWeather>>,
}

impl LocalPlugin {
    pub fn new(geocoder: Arc<Geocoder>, metar: Arc<MetarService>, weather: Option<Arc<OpenWeather>>) -> Self {
        LocalPlugin { geocoder, metar, weather }
    }

    /// `query` wins over coordinates. Without either there is nobody to ask.
    async fn locate(&self, params: &Value) -> Result<Coordinate, SkyError> {
        let query = params.get("query").and_then(Value::as_str).map(str::trim).filter(|q| !q.is_empty());
        if let Some(query) = query {
            return self.geocoder.locate(query).await;
        }
        let has_latitude = !matches!(params.get("latitude"), None | Some(Value::Null));
        let has_longitude = !matches!(params.get("longitude"), None | Some(Value::Null));
        if has_latitude && has_longitude {
            return coordinate_arg(params);
        }
        Err(SkyError::invalid("a location is needed: pass 'query' or both 'latitude' and 'longitude'"))
    }

    fn weather(&self) -> Result<&OpenWeather, SkyError> {
        self.weather
            .as_deref()
            .ok_or_else(|| SkyError::Unsupported("weather needs an OpenWeatherMap API key".to_string()))
    }

    async fn run(&self, operation: &str, params: &Value) -> PluginResult {
        let here = self.locate(params).await?;
        info!("Local {} at {}", operation, here);
        match operation {
            "COORDINATES" => Ok(serde_json::to_value(here)?),
            "MOON" => astro::moon(Utc::now()),
            "SUN" => astro::sun(&here, Utc::now(), astro::local_offset()),
            "METAR" => {
                let radius = optional_f64(params, "radius_km")?.unwrap_or(DEFAULT_RADIUS_KM);
                let reports = self.metar.nearby(here, radius, DEFAULT_MAX_AGE_SECS, Utc::now()).await?;
                Ok(serde_json::to_value(reports)?)
            }
            "WEATHER" => self.weather()?.current(&here, units_arg(params)?).await,
            "UV_INDEX" => Ok(json!(self.weather()?.uv_index(&here).await?)),
            _ => Err(SkyError::Unsupported(operation.to_string())),
        }
    }
}

impl SkyPlugin for LocalPlugin {
    fn name(&self) -> &str {
        "Local"
    }

    fn description(&self) -> &str {
        "Sky toolbox for one place: coordinates, moon, nearby METAR reports, sunrise and sunset (and weather and UV index when configured)"
    }

    fn category(&self) -> &str {
        "toolbox"
    }

    fn supported_operations(&self) -> Vec<String> {
        let extra: &[&str] = if self.weather.is_some() { &WEATHER_OPERATIONS } else { &[] };
        BASE_OPERATIONS.iter().chain(extra).map(|op| op.to_string()).collect()
    }

    fn input_schema(&self) -> Value {
        let mut properties = json!({
            "query": { "type": "string", "description": "Place name; used instead of coordinates when given" },
            "latitude": { "type": "number", "minimum": -90, "maximum": 90 },
            "longitude": { "type": "number", "minimum": -180, "maximum": 180 },
            "radius_km": { "type": "number", "default": DEFAULT_RADIUS_KM, "description": "METAR search radius" }
        });
        if self.weather.is_some() {
            if let Some(props) = properties.as_object_mut() {
                props.insert("units".to_string(), units_property());
            }
        }
        operation_schema(&self.supported_operations(), properties, &[])
    }

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        Some(ToolAnnotations::read_only("Local sky"))
    }

    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
        Box::pin(self.run(operation, params))
    }

    fn completions(&self, param_name: &str, partial_value: &str) -> Vec<String> {
        match param_name {
            "operation" => {
                let prefix = partial_value.trim().to_uppercase();
                self.supported_operations().into_iter().filter(|op| op.starts_with(&prefix)).collect()
            }
            _ => Vec::new(),
        }
    }
}
