// sky-server/src/plugins/openweather/plugin.rs
use serde_json::{json, Value};
use sky_common::plugin::{coordinate_arg, coordinate_properties, operation_schema};
use sky_common::{PluginFuture, PluginType, SkyError, SkyPlugin, ToolAnnotations};
use std::sync::Arc;

use super::{OpenWeather, Units};

/// Reads the optional `units` argument; metric when absent.
pub(crate) fn units_arg(params: &Value) -> Result<Units, SkyError> {
    match params.get("units") {
        None | Some(Value::Null) => Ok(Units::default()),
        Some(Value::String(s)) => s.parse(),
        Some(other) => Err(SkyError::invalid(format!("units must be a string, got {}", other))),
    }
}

pub(crate) fn units_property() -> Value {
    json!({ "type": "string", "enum": Units::ALL, "default": "metric", "description": "Unit system" })
}

/// `weather(latitude, longitude, units)`: current conditions from OpenWeatherMap.
pub struct WeatherPlugin {
    owm: Arc<OpenWeather>,
}

impl WeatherPlugin {
    pub fn new(owm: Arc<OpenWeather>) -> Self {
        WeatherPlugin { owm }
    }
}

impl SkyPlugin for WeatherPlugin {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Current weather at a location (OpenWeatherMap)"
    }

    fn category(&self) -> &str {
        "weather"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Extension
    }

    fn supported_operations(&self) -> Vec<String> {
        vec!["GET".to_string()]
    }

    fn input_schema(&self) -> Value {
        let mut properties = coordinate_properties();
        if let Some(props) = properties.as_object_mut() {
            props.insert("units".to_string(), units_property());
        }
        operation_schema(&self.supported_operations(), properties, &["latitude", "longitude"])
    }

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        Some(ToolAnnotations::read_only("Current weather"))
    }

    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
        Box::pin(async move {
            match operation {
                "GET" => self.owm.current(&coordinate_arg(params)?, units_arg(params)?).await,
                _ => Err(SkyError::Unsupported(operation.to_string())),
            }
        })
    }

    fn completions(&self, param_name: &str, partial_value: &str) -> Vec<String> {
        match param_name {
            "units" => Units::ALL
                .iter()
                .filter(|u| u.starts_with(&partial_value.to_lowercase()))
                .map(|u| u.to_string())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// `uv_index(latitude, longitude)`.
pub struct UvIndexPlugin {
    owm: Arc<OpenWeather>,
}

impl UvIndexPlugin {
    pub fn new(owm: Arc<OpenWeather>) -> Self {
        UvIndexPlugin { owm }
    }
}

impl SkyPlugin for UvIndexPlugin {
    fn name(&self) -> &str {
        "uv_index"
    }

    fn description(&self) -> &str {
        "Current UV index at a location (OpenWeatherMap)"
    }

    fn category(&self) -> &str {
        "weather"
    }

    fn plugin_type(&self) -> PluginType {
        PluginType::Extension
    }

    fn supported_operations(&self) -> Vec<String> {
        vec!["GET".to_string()]
    }

    fn input_schema(&self) -> Value {
        operation_schema(&self.supported_operations(), coordinate_properties(), &["latitude", "longitude"])
    }

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        Some(ToolAnnotations::read_only("UV index"))
    }

    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
        Box::pin(async move {
            match operation {
                "GET" => Ok(json!(self.owm.uv_index(&coordinate_arg(params)?).await?)),
                _ => Err(SkyError::Unsupported(operation.to_string())),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    fn plugin() -> WeatherPlugin {
        WeatherPlugin::new(Arc::new(OpenWeather::new(Client::new(), "http://127.0.0.1:9", "k")))
    }

    #[test]
    fn units_default_to_metric() {
        assert_eq!(units_arg(&json!({})).unwrap(), Units::Metric);
        assert_eq!(units_arg(&json!({"units": "standard"})).unwrap(), Units::Standard);
        assert!(units_arg(&json!({"units": 3})).is_err());
    }

    #[test]
    fn units_complete_by_prefix() {
        assert_eq!(plugin().completions("units", "im"), vec!["imperial"]);
        assert_eq!(plugin().completions("units", "").len(), 3);
        assert!(plugin().completions("latitude", "4").is_empty());
    }

    #[tokio::test]
    async fn bad_units_fail_before_any_request() {
        let err = plugin()
            .execute("GET", &json!({"latitude": 1, "longitude": 2, "units": "kelvin"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SkyError::InvalidArgument(_)));
    }
}
