// sky-common/src/lib.rs
use serde::{Deserialize, Serialize};
use serde_json::Value; // Params and results stay dynamic at the wire level
use std::collections::HashMap;

pub mod astro;
pub mod error;
pub mod geo;
pub mod metar;
pub mod plugin;

pub use error::{SkyError, SkyResult};
pub use geo::Coordinate;
pub use plugin::{PluginFuture, PluginResult, PluginType, SkyPlugin};

// --- Protocol Constants ---
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";
pub const SERVER_NAME: &str = "sky";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Session header used by the streamable HTTP transport.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

// JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;
/// MCP code for an unknown resource URI
pub const RESOURCE_NOT_FOUND: i32 = -32002;

// --- JSON-RPC Base Types ---
pub fn default_jsonrpc() -> String { "2.0".to_string() }

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MCPRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Absent for notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl MCPRequest {
    pub fn new(id: impl Into<Value>, method: &str, params: Option<Value>) -> Self {
        MCPRequest { jsonrpc: default_jsonrpc(), id: Some(id.into()), method: method.to_string(), params }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MCPResponse {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    pub id: Value, // String, Number, or Null
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MCPError>,
}

impl MCPResponse {
    pub fn success(id: Value, result: impl Serialize) -> Self {
        // Result types here are plain structs; serialization cannot fail short of a bug.
        let result = serde_json::to_value(result).unwrap_or(Value::Null);
        MCPResponse { jsonrpc: default_jsonrpc(), id, result: Some(result), error: None }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>) -> Self {
        MCPResponse {
            jsonrpc: default_jsonrpc(),
            id,
            result: None,
            error: Some(MCPError { code, message: message.into(), data: None }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MCPError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// --- Annotations ---
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    User,
    Assistant,
}

// --- Content Items ---
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentItem {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        annotations: Option<Annotations>
    },
    Resource {
        resource: TextResourceContents,
        #[serde(skip_serializing_if = "Option::is_none")]
        annotations: Option<Annotations>
    },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        ContentItem::Text { text: text.into(), annotations: None }
    }

    /// Renders a tool result: strings verbatim, everything else as pretty JSON.
    pub fn from_value(value: Value) -> Vec<ContentItem> {
        match value {
            Value::String(s) => vec![ContentItem::text(s)],
            Value::Null => vec![],
            other => {
                let text = serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string());
                vec![ContentItem::text(text)]
            }
        }
    }
}

// --- Resources ---
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TextResourceContents {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReadResourceResult {
    pub contents: Vec<TextResourceContents>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
     pub resources: Vec<Resource>,
     #[serde(skip_serializing_if = "Option::is_none")]
     pub next_cursor: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    pub uri_template: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    pub resource_templates: Vec<ResourceTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

// --- Tools ---

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

impl ToolAnnotations {
    /// Every sky tool only reads from public services.
    pub fn read_only(title: &str) -> Self {
        ToolAnnotations {
            title: Some(title.to_string()),
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: Some(true),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
     pub tools: Vec<Tool>,
     #[serde(skip_serializing_if = "Option::is_none")]
     pub next_cursor: Option<String>,
}

// --- Capabilities ---

#[derive(Serialize, Deserialize, Debug, Clone, Default)] #[serde(rename_all = "camelCase")] pub struct CompletionsCapability {}
#[derive(Serialize, Deserialize, Debug, Clone, Default)] #[serde(rename_all = "camelCase")] pub struct ResourcesCapability { #[serde(default)] pub subscribe: bool, #[serde(default)] pub list_changed: bool, }
#[derive(Serialize, Deserialize, Debug, Clone, Default)] #[serde(rename_all = "camelCase")] pub struct ToolsCapability { #[serde(default)] pub list_changed: bool, }

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
     #[serde(skip_serializing_if = "Option::is_none")]
     pub experimental: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

// --- Initialization ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Implementation {
    pub name: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    pub client_info: Implementation,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    pub server_info: Implementation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// --- Completions ---
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequestParams {
    pub r#ref: CompletionRef,
    pub argument: CompletionArgument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum CompletionRef {
    #[serde(rename = "ref/tool")]
    Tool { name: String },
    #[serde(rename = "ref/resource")]
    Resource { uri: String },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompletionArgument {
    pub name: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResultCompletion {
    pub values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CompleteResult {
    pub completion: CompleteResultCompletion,
}

// --- Discovery ---

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Provider {
    pub name: String,
    pub domain: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DiscoveryResponse {
    pub provider: Provider,
    pub mode: String,
    pub capabilities: Vec<CapabilityDescription>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CapabilityDescription {
    pub name: String,
    pub description: String,
    pub category: String,
    pub operations: Vec<String>,
}

/// For requests that succeed with no data (ping).
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct EmptyResult {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_has_no_id() {
        let req: MCPRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(req.is_notification());

        let req: MCPRequest = serde_json::from_value(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})).unwrap();
        assert!(!req.is_notification());
        assert_eq!(req.id, Some(json!(7)));
    }

    #[test]
    fn failure_response_omits_result() {
        let resp = MCPResponse::failure(json!(1), METHOD_NOT_FOUND, "Method not found: nope");
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["error"]["code"], json!(-32601));
        assert!(wire.get("result").is_none());
    }

    #[test]
    fn tool_results_render_as_text() {
        assert!(ContentItem::from_value(Value::Null).is_empty());

        match &ContentItem::from_value(json!("waxing moon"))[0] {
            ContentItem::Text { text, .. } => assert_eq!(text, "waxing moon"),
            other => panic!("unexpected content {:?}", other),
        }

        match &ContentItem::from_value(json!({"sunrise": "06:12"}))[0] {
            ContentItem::Text { text, .. } => assert!(text.contains("\"sunrise\": \"06:12\"")),
            other => panic!("unexpected content {:?}", other),
        }
    }

    #[test]
    fn completion_ref_uses_tagged_type() {
        let params: CompleteRequestParams = serde_json::from_value(json!({
            "ref": {"type": "ref/tool", "name": "metar"},
            "argument": {"name": "code", "value": "LO"}
        }))
        .unwrap();
        assert!(matches!(params.r#ref, CompletionRef::Tool { ref name } if name == "metar"));
        assert_eq!(params.argument.value, "LO");
    }
}
