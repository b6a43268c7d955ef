// sky-server/src/plugin_registry.rs

use serde_json::Value;
use sky_common::{PluginResult, SkyError, SkyPlugin};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry that manages all available plugins. Filled at startup, then
/// shared read-only behind an `Arc`.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn SkyPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry { plugins: BTreeMap::new() }
    }

    /// Register a plugin with the registry
    pub fn register_plugin(&mut self, plugin: Arc<dyn SkyPlugin>) -> Result<(), SkyError> {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            return Err(SkyError::invalid(format!("plugin '{}' is already registered", name)));
        }
        self.plugins.insert(name, plugin);
        Ok(())
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn SkyPlugin>> {
        self.plugins.get(name).cloned()
    }

    /// All plugins, ordered by name
    pub fn get_all_plugins(&self) -> Vec<Arc<dyn SkyPlugin>> {
        self.plugins.values().cloned().collect()
    }

    /// Execute a plugin operation. Without an operation the plugin's first
    /// one is used; operation names match case-insensitively.
    pub async fn execute_plugin(&self, name: &str, operation: Option<&str>, params: &Value) -> PluginResult {
        let plugin = self
            .get_plugin(name)
            .ok_or_else(|| SkyError::NotFound(format!("tool '{}' not found", name)))?;

        let supported = plugin.supported_operations();
        let operation = match operation {
            Some(requested) => supported
                .iter()
                .find(|op| op.eq_ignore_ascii_case(requested.trim()))
                .cloned()
                .ok_or_else(|| {
                    SkyError::Unsupported(format!(
                        "'{}' for tool '{}' (expected one of {})",
                        requested,
                        name,
                        supported.join(", ")
                    ))
                })?,
            None => supported
                .first()
                .cloned()
                .ok_or_else(|| SkyError::Unsupported(format!("tool '{}' has no operations", name)))?,
        };

        plugin.execute(&operation, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sky_common::PluginFuture;

    struct Echo;

    impl SkyPlugin for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes the operation"
        }
        fn category(&self) -> &str {
            "test"
        }
        fn supported_operations(&self) -> Vec<String> {
            vec!["LOUD".to_string(), "QUIET".to_string()]
        }
        fn input_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn execute<'a>(&'a self, operation: &'a str, params: &'a Value) -> PluginFuture<'a> {
            Box::pin(async move { Ok(json!({"operation": operation, "params": params})) })
        }
    }

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry.register_plugin(Arc::new(Echo)).unwrap();
        registry
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = registry();
        assert!(registry.register_plugin(Arc::new(Echo)).is_err());
        assert_eq!(registry.get_all_plugins().len(), 1);
    }

    #[tokio::test]
    async fn first_operation_is_the_default() {
        let result = registry().execute_plugin("echo", None, &json!({"x": 1})).await.unwrap();
        assert_eq!(result["operation"], json!("LOUD"));
        assert_eq!(result["params"]["x"], json!(1));
    }

    #[tokio::test]
    async fn operations_match_case_insensitively() {
        let result = registry().execute_plugin("echo", Some("quiet"), &json!({})).await.unwrap();
        assert_eq!(result["operation"], json!("QUIET"));
    }

    #[tokio::test]
    async fn unknown_tool_and_operation_fail() {
        let registry = registry();
        assert!(matches!(registry.execute_plugin("nope", None, &json!({})).await, Err(SkyError::NotFound(_))));
        assert!(matches!(
            registry.execute_plugin("echo", Some("DELETE"), &json!({})).await,
            Err(SkyError::Unsupported(_))
        ));
    }
}
