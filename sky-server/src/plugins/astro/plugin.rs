// sky-server/src/plugins/astro/plugin.rs
use chrono::Utc;
use serde_json::Value;
use sky_common::plugin::{coordinate_arg, coordinate_properties, operation_schema};
use sky_common::{PluginFuture, SkyError, SkyPlugin, ToolAnnotations};

use super::operations::{self, local_offset};

/// `sun(latitude, longitude)`: sunrise, sunset and day length for today.
pub struct SunPlugin;

impl SkyPlugin for SunPlugin {
    fn name(&self) -> &str {
        "sun"
    }

    fn description(&self) -> &str {
        "Sunrise, sunset and day length at a location, in the server's local time"
    }

    fn category(&self) -> &str {
        "astronomy"
    }

    fn supported_operations(&self) -> Vec<String> {
        vec!["GET".to_string()]
    }

    fn input_schema(&self) -> Value {
        operation_schema(&self.supported_operations(), coordinate_properties(), &["latitude", "longitude"])
    }

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        Some(ToolAnnotations::read_only("Sunrise and sunset"))
    }

    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
        Box::pin(async move {
            match operation {
                "GET" => operations::sun(&coordinate_arg(params)?, Utc::now(), local_offset()),
                _ => Err(SkyError::Unsupported(operation.to_string())),
            }
        })
    }
}

/// `moon(latitude, longitude)`: phase, illumination and days to full moon.
pub struct MoonPlugin;

impl SkyPlugin for MoonPlugin {
    fn name(&self) -> &str {
        "moon"
    }

    fn description(&self) -> &str {
        "Current moon phase: waxing or waning, illumination and days to the next full moon"
    }

    fn category(&self) -> &str {
        "astronomy"
    }

    fn supported_operations(&self) -> Vec<String> {
        vec!["GET".to_string(), "DETAILS".to_string()]
    }

    fn input_schema(&self) -> Value {
        operation_schema(&self.supported_operations(), coordinate_properties(), &["latitude", "longitude"])
    }

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        Some(ToolAnnotations::read_only("Moon phase"))
    }

    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
        Box::pin(async move {
            // Validated for a consistent interface even though the phase is geocentric
            coordinate_arg(params)?;
            match operation {
                "GET" => operations::moon(Utc::now()),
                "DETAILS" => Ok(operations::moon_details(Utc::now())),
                _ => Err(SkyError::Unsupported(operation.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn sun_needs_coordinates() {
        let err = SunPlugin.execute("GET", &json!({"latitude": 47.0})).await.unwrap_err();
        assert!(matches!(err, SkyError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn sun_answers_with_times() {
        let value = SunPlugin.execute("GET", &json!({"latitude": 47.07, "longitude": 15.44})).await.unwrap();
        assert!(value.get("sunrise").is_some());
        assert!(value.get("sunset").is_some());
    }

    #[tokio::test]
    async fn moon_answers_with_text() {
        let value = MoonPlugin.execute("GET", &json!({"latitude": 47.07, "longitude": 15.44})).await.unwrap();
        assert!(value.as_str().unwrap().contains("full moon"));
        let details = MoonPlugin.execute("DETAILS", &json!({"latitude": 0, "longitude": 0})).await.unwrap();
        assert!(details["illumination"].is_number());
    }
}
