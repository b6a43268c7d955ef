// sky-server/src/plugins/geocode/plugin.rs
use serde_json::{json, Value};
use sky_common::plugin::{operation_schema, required_str};
use sky_common::{PluginFuture, SkyError, SkyPlugin, ToolAnnotations};
use std::sync::Arc;

use super::Geocoder;

/// `geocode(query)`: resolve a place name to coordinates.
pub struct GeocodePlugin {
    geocoder: Arc<Geocoder>,
}

impl GeocodePlugin {
    pub fn new(geocoder: Arc<Geocoder>) -> Self {
        GeocodePlugin { geocoder }
    }
}

impl SkyPlugin for GeocodePlugin {
    fn name(&self) -> &str {
        "geocode"
    }

    fn description(&self) -> &str {
        "Resolve a place name to geographic coordinates (OpenStreetMap Nominatim)"
    }

    fn category(&self) -> &str {
        "geo"
    }

    fn supported_operations(&self) -> Vec<String> {
        vec!["GET".to_string()]
    }

    fn input_schema(&self) -> Value {
        operation_schema(
            &self.supported_operations(),
            json!({
                "query": { "type": "string", "description": "Place name or address, e.g. \"Graz\"" }
            }),
            &["query"],
        )
    }

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        Some(ToolAnnotations::read_only("Geocode a place"))
    }

    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
        Box::pin(async move {
            match operation {
                "GET" => self.geocoder.search(required_str(params, "query")?).await,
                _ => Err(SkyError::Unsupported(operation.to_string())),
            }
        })
    }
}
