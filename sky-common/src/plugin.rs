// sky-common/src/plugin.rs
use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;

use crate::{Coordinate, SkyError, ToolAnnotations};

// Plugin type to distinguish between core and extension plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginType {
    Core,      // Always registered
    Extension, // Needs extra configuration (API keys)
}

/// Result type for plugin operations (used by `execute`)
pub type PluginResult = Result<Value, SkyError>;

/// Boxed future so the trait stays object-safe.
pub type PluginFuture<'a> = Pin<Box<dyn Future<Output = PluginResult> + Send + 'a>>;

/// Future returned by `read_resource`, resolving to the fragment text.
pub type ResourceFuture<'a> = Pin<Box<dyn Future<Output = Result<String, SkyError>> + Send + 'a>>;

/// A resource advertised by a plugin in `resources/list`, or a URI template
/// in `resources/templates/list` when the suffix holds a `{placeholder}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub name: String,
    /// Part of the URI after `resources/<plugin>/`
    pub suffix: String,
    pub description: Option<String>,
    pub mime_type: &'static str,
}

/// Trait that defines the interface for sky tools. One plugin is one MCP tool.
pub trait SkyPlugin: Send + Sync {
    /// Tool name as seen by the host
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn category(&self) -> &str;

    fn plugin_type(&self) -> PluginType {
        PluginType::Core
    }

    /// Operations accepted in the `operation` argument. The first is the default.
    fn supported_operations(&self) -> Vec<String>;

    /// JSON schema of the `tools/call` arguments
    fn input_schema(&self) -> Value;

    /// Run an operation. `params` is the full `arguments` object of the call.
    fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a>;

    fn tool_annotations(&self) -> Option<ToolAnnotations> {
        None
    }

    /// Resources for `resources/list`.
    fn resources(&self) -> Vec<ResourceEntry> {
        Vec::new()
    }

    /// Parameterised resources for `resources/templates/list`.
    fn resource_templates(&self) -> Vec<ResourceEntry> {
        Vec::new()
    }

    /// Read a resource by the URI suffix following the plugin name,
    /// e.g. `LOWG` for `mcpi://sky.local/resources/metar/LOWG`.
    fn read_resource<'a>(&'a self, suffix: &'a str) -> ResourceFuture<'a> {
        let err = SkyError::Unsupported(format!("plugin '{}' has no resource '{}'", self.name(), suffix));
        Box::pin(async move { Err(err) })
    }

    /// Suggestions for a partially typed argument.
    fn completions(&self, param_name: &str, partial_value: &str) -> Vec<String> {
        let _ = (param_name, partial_value);
        Vec::new()
    }
}

/// Builds an object schema with an `operation` enum in front of the tool's own properties.
pub fn operation_schema(operations: &[String], properties: Value, required: &[&str]) -> Value {
    let mut props = Map::new();
    props.insert(
        "operation".to_string(),
        json!({
            "type": "string",
            "enum": operations,
            "description": "Operation to perform"
        }),
    );
    if let Value::Object(extra) = properties {
        props.extend(extra);
    }
    json!({
        "type": "object",
        "properties": props,
        "required": required
    })
}

// --- Argument helpers ---

pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, SkyError> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| SkyError::invalid(format!("'{}' is required", key)))
}

/// Reads a number, accepting numeric strings as some hosts send everything quoted.
pub fn optional_f64(params: &Value, key: &str) -> Result<Option<f64>, SkyError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| SkyError::invalid(format!("'{}' must be a number, got '{}'", key, s))),
        Some(other) => Err(SkyError::invalid(format!("'{}' must be a number, got {}", key, other))),
    }
}

pub fn required_f64(params: &Value, key: &str) -> Result<f64, SkyError> {
    optional_f64(params, key)?.ok_or_else(|| SkyError::invalid(format!("'{}' is required", key)))
}

/// `latitude` and `longitude` arguments as a validated coordinate.
pub fn coordinate_arg(params: &Value) -> Result<Coordinate, SkyError> {
    Coordinate::new(required_f64(params, "latitude")?, required_f64(params, "longitude")?)
}

pub fn coordinate_properties() -> Value {
    json!({
        "latitude": { "type": "number", "minimum": -90, "maximum": 90, "description": "Latitude in decimal degrees" },
        "longitude": { "type": "number", "minimum": -180, "maximum": 180, "description": "Longitude in decimal degrees" }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_may_arrive_as_strings() {
        let params = json!({"latitude": "47.07", "longitude": 15.44});
        let c = coordinate_arg(&params).unwrap();
        assert_eq!(c.latitude, 47.07);
        assert_eq!(c.longitude, 15.44);
    }

    #[test]
    fn missing_and_bad_arguments_are_rejected() {
        assert!(matches!(required_f64(&json!({}), "latitude"), Err(SkyError::InvalidArgument(_))));
        assert!(matches!(optional_f64(&json!({"x": "abc"}), "x"), Err(SkyError::InvalidArgument(_))));
        assert!(matches!(optional_f64(&json!({"x": true}), "x"), Err(SkyError::InvalidArgument(_))));
        assert!(matches!(required_str(&json!({"q": "  "}), "q"), Err(SkyError::InvalidArgument(_))));
        assert!(matches!(coordinate_arg(&json!({"latitude": 95, "longitude": 0})), Err(SkyError::InvalidArgument(_))));
    }

    #[test]
    fn schema_puts_operation_first() {
        let ops = vec!["GET".to_string()];
        let schema = operation_schema(&ops, json!({"code": {"type": "string"}}), &["code"]);
        assert_eq!(schema["properties"]["operation"]["enum"], json!(["GET"]));
        assert_eq!(schema["properties"]["code"]["type"], json!("string"));
        assert_eq!(schema["required"], json!(["code"]));
    }
}
