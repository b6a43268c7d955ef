// sky-server/src/rpc.rs
//! JSON-RPC dispatch shared by the HTTP and WebSocket transports.

use serde_json::Value;
use sky_common::{
    CallToolResult, CompleteRequestParams, CompleteResult, CompleteResultCompletion, CompletionRef, CompletionsCapability,
    ContentItem, EmptyResult, Implementation, InitializeParams, InitializeResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    MCPRequest, MCPResponse, Provider, ReadResourceResult, Resource, ResourceTemplate, ResourcesCapability, ServerCapabilities, SkyError,
    SkyPlugin, TextResourceContents, Tool, ToolsCapability, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    MCP_PROTOCOL_VERSION, METHOD_NOT_FOUND, PARSE_ERROR, RESOURCE_NOT_FOUND, SERVER_VERSION,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use url::Url;

use crate::plugin_registry::PluginRegistry;

/// Cap on completion values per answer
const MAX_COMPLETIONS: usize = 100;

pub struct RpcContext {
    pub registry: Arc<PluginRegistry>,
    pub provider: Provider,
}

/// Handles one message: a request, a notification or a batch. Returns the
/// serialized response, or `None` when nothing needs answering.
pub async fn process_mcp_message(message: &str, ctx: &RpcContext) -> Option<String> {
    let value: Value = match serde_json::from_str(message) {
        Ok(value) => value,
        Err(e) => {
            error!("Parse error: {}", e);
            return to_json(&MCPResponse::failure(Value::Null, PARSE_ERROR, format!("Parse error: {}", e)));
        }
    };

    match value {
        Value::Array(batch) if batch.is_empty() => {
            to_json(&MCPResponse::failure(Value::Null, INVALID_REQUEST, "Empty batch"))
        }
        Value::Array(batch) => {
            let mut responses = Vec::with_capacity(batch.len());
            for item in batch {
                if let Some(response) = process_value(item, ctx).await {
                    responses.push(response);
                }
            }
            if responses.is_empty() {
                None
            } else {
                to_json(&responses)
            }
        }
        single => process_value(single, ctx).await.and_then(|r| to_json(&r)),
    }
}

/// True when the message (or any batch entry) is an `initialize` request.
pub fn is_initialize(message: &str) -> bool {
    fn check(v: &Value) -> bool {
        v.get("method").and_then(Value::as_str) == Some("initialize")
    }
    match serde_json::from_str::<Value>(message) {
        Ok(Value::Array(batch)) => batch.iter().any(check),
        Ok(v) => check(&v),
        Err(_) => false,
    }
}

fn to_json<T: serde::Serialize>(response: &T) -> Option<String> {
    match serde_json::to_string(response) {
        Ok(s) => Some(s),
        Err(e) => {
            error!("Could not serialize response: {}", e);
            None
        }
    }
}

async fn process_value(value: Value, ctx: &RpcContext) -> Option<MCPResponse> {
    let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
    // A present but null id is neither a request nor a notification.
    if value.get("id").is_some_and(Value::is_null) {
        warn!("Rejecting request with a null id");
        return Some(MCPResponse::failure(Value::Null, INVALID_REQUEST, "Request id must not be null"));
    }
    let request: MCPRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            warn!("Invalid request: {}", e);
            return Some(MCPResponse::failure(id_hint, INVALID_REQUEST, format!("Invalid request: {}", e)));
        }
    };

    let span = tracing::info_span!("mcp_request", method = %request.method, id = ?request.id);
    let result = dispatch(&request, ctx).instrument(span).await;

    match request.id {
        // Notifications never get an answer, not even an error.
        None => {
            if let Err((code, message)) = result {
                debug!("Notification {} failed ({}): {}", request.method, code, message);
            }
            None
        }
        Some(id) => Some(match result {
            Ok(value) => MCPResponse::success(id, value),
            Err((code, message)) => MCPResponse::failure(id, code, message),
        }),
    }
}

type RpcResult = Result<Value, (i32, String)>;

async fn dispatch(request: &MCPRequest, ctx: &RpcContext) -> RpcResult {
    info!("Processing");
    match request.method.as_str() {
        "initialize" => handle_initialize(request, ctx),
        "notifications/initialized" | "notifications/cancelled" => Ok(Value::Null),
        "ping" => serialize(EmptyResult {}),
        "tools/list" => handle_list_tools(ctx),
        "tools/call" => handle_call_tool(request, ctx).await,
        "resources/list" => handle_list_resources(ctx),
        "resources/templates/list" => handle_list_resource_templates(ctx),
        "resources/read" => handle_read_resource(request, ctx).await,
        "completion/complete" | "completions" => handle_completions(request, ctx),
        other => {
            warn!("Method not found: {}", other);
            Err((METHOD_NOT_FOUND, format!("Method not found: {}", other)))
        }
    }
}

fn serialize<T: serde::Serialize>(result: T) -> RpcResult {
    serde_json::to_value(result).map_err(|e| (INTERNAL_ERROR, e.to_string()))
}

fn invalid_params(message: impl Into<String>) -> (i32, String) {
    (INVALID_PARAMS, message.into())
}

// --- Handlers ---

fn handle_initialize(request: &MCPRequest, ctx: &RpcContext) -> RpcResult {
    if let Some(params) = &request.params {
        match serde_json::from_value::<InitializeParams>(params.clone()) {
            Ok(p) => info!(
                "Client {} {} connected (protocol {})",
                p.client_info.name, p.client_info.version, p.protocol_version
            ),
            Err(e) => debug!("Ignoring unrecognised initialize params: {}", e),
        }
    }

    let plugins = ctx.registry.get_all_plugins();
    let names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();

    serialize(InitializeResult {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            completions: Some(CompletionsCapability {}),
            resources: Some(ResourcesCapability { subscribe: false, list_changed: false }),
            tools: Some(ToolsCapability { list_changed: false }),
        },
        server_info: Implementation { name: ctx.provider.name.clone(), version: SERVER_VERSION.to_string() },
        instructions: Some(format!("{} Tools: {}.", ctx.provider.description, names.join(", "))),
    })
}

fn handle_list_tools(ctx: &RpcContext) -> RpcResult {
    let tools = ctx
        .registry
        .get_all_plugins()
        .iter()
        .map(|p| Tool {
            name: p.name().to_string(),
            description: Some(p.description().to_string()),
            input_schema: p.input_schema(),
            annotations: p.tool_annotations(),
        })
        .collect();
    serialize(ListToolsResult { tools, next_cursor: None })
}

async fn handle_call_tool(request: &MCPRequest, ctx: &RpcContext) -> RpcResult {
    let params = request.params.as_ref().and_then(Value::as_object).ok_or_else(|| invalid_params("tools/call needs params"))?;
    let name = params.get("name").and_then(Value::as_str).ok_or_else(|| invalid_params("tools/call needs a tool name"))?;
    if ctx.registry.get_plugin(name).is_none() {
        return Err(invalid_params(format!("Unknown tool: {}", name)));
    }

    let empty = Value::Object(Default::default());
    let args = params.get("arguments").filter(|a| !a.is_null()).unwrap_or(&empty);
    let operation = args.get("operation").and_then(Value::as_str);

    // Tool failures are results the model can read, not protocol errors.
    let result = match ctx.registry.execute_plugin(name, operation, args).await {
        Ok(value) => CallToolResult { content: ContentItem::from_value(value), is_error: false },
        Err(e) => {
            warn!("Tool {} failed: {}", name, e);
            CallToolResult { content: vec![ContentItem::text(e.to_string())], is_error: true }
        }
    };
    serialize(result)
}

fn resource_uri(domain: &str, plugin: &str, suffix: &str) -> String {
    format!("mcpi://{}/resources/{}/{}", domain, plugin, suffix)
}

fn handle_list_resources(ctx: &RpcContext) -> RpcResult {
    let domain = &ctx.provider.domain;
    let resources = ctx
        .registry
        .get_all_plugins()
        .iter()
        .flat_map(|p| {
            p.resources().into_iter().map(move |entry| Resource {
                uri: resource_uri(domain, p.name(), &entry.suffix),
                name: entry.name,
                description: entry.description,
                mime_type: Some(entry.mime_type.to_string()),
                annotations: None,
            })
        })
        .collect();
    serialize(ListResourcesResult { resources, next_cursor: None })
}

fn handle_list_resource_templates(ctx: &RpcContext) -> RpcResult {
    let domain = &ctx.provider.domain;
    let resource_templates = ctx
        .registry
        .get_all_plugins()
        .iter()
        .flat_map(|p| {
            p.resource_templates().into_iter().map(move |entry| ResourceTemplate {
                uri_template: resource_uri(domain, p.name(), &entry.suffix),
                name: entry.name,
                description: entry.description,
                mime_type: Some(entry.mime_type.to_string()),
            })
        })
        .collect();
    serialize(ListResourceTemplatesResult { resource_templates, next_cursor: None })
}

/// Splits a resource URI into plugin name and suffix. Accepts
/// `mcpi://<domain>/resources/<plugin>/<suffix>` and the short `<plugin>:<suffix>`.
pub fn parse_resource_uri(uri: &str) -> Result<(String, String), SkyError> {
    let parsed = Url::parse(uri).map_err(|e| SkyError::invalid(format!("invalid resource URI '{}': {}", uri, e)))?;

    if parsed.scheme() == "mcpi" {
        let segments: Vec<&str> = parsed.path_segments().map(|s| s.filter(|p| !p.is_empty()).collect()).unwrap_or_default();
        return match segments.as_slice() {
            ["resources", plugin, rest @ ..] if !rest.is_empty() => Ok((plugin.to_string(), rest.join("/"))),
            _ => Err(SkyError::invalid(format!("resource URI '{}' must look like mcpi://<domain>/resources/<tool>/<name>", uri))),
        };
    }

    if parsed.cannot_be_a_base() && !parsed.path().is_empty() {
        return Ok((parsed.scheme().to_string(), parsed.path().to_string()));
    }
    Err(SkyError::invalid(format!("unsupported resource URI '{}'", uri)))
}

async fn handle_read_resource(request: &MCPRequest, ctx: &RpcContext) -> RpcResult {
    let uri = request
        .params
        .as_ref()
        .and_then(|p| p.get("uri"))
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params("resources/read needs a uri"))?;

    let (plugin_name, suffix) = parse_resource_uri(uri).map_err(|e| invalid_params(e.to_string()))?;
    let plugin = ctx
        .registry
        .get_plugin(&plugin_name)
        .ok_or_else(|| (RESOURCE_NOT_FOUND, format!("Resource not found: {}", uri)))?;

    let text = plugin.read_resource(&suffix).await.map_err(|e| {
        warn!("Reading {} failed: {}", uri, e);
        let code = match e {
            SkyError::InvalidArgument(_) => INVALID_PARAMS,
            SkyError::NotFound(_) | SkyError::Unsupported(_) => RESOURCE_NOT_FOUND,
            _ => INTERNAL_ERROR,
        };
        (code, e.to_string())
    })?;

    serialize(ReadResourceResult {
        contents: vec![TextResourceContents { uri: uri.to_string(), mime_type: Some("text/plain".to_string()), text }],
    })
}

fn handle_completions(request: &MCPRequest, ctx: &RpcContext) -> RpcResult {
    let params: CompleteRequestParams = request
        .params
        .clone()
        .ok_or_else(|| invalid_params("completion/complete needs params"))
        .and_then(|p| serde_json::from_value(p).map_err(|e| invalid_params(format!("Invalid completion params: {}", e))))?;

    let argument = &params.argument;
    let plugin = match &params.r#ref {
        CompletionRef::Tool { name } => ctx.registry.get_plugin(name),
        CompletionRef::Resource { uri } => parse_resource_uri(uri).ok().and_then(|(name, _)| ctx.registry.get_plugin(&name)),
    };

    let mut values = match plugin {
        Some(plugin) => complete_argument(plugin.as_ref(), &argument.name, &argument.value),
        None if argument.name == "name" => ctx
            .registry
            .get_all_plugins()
            .iter()
            .map(|p| p.name().to_string())
            .filter(|n| n.starts_with(argument.value.as_str()))
            .collect(),
        None => Vec::new(),
    };

    let total = values.len();
    values.truncate(MAX_COMPLETIONS);
    serialize(CompleteResult {
        completion: CompleteResultCompletion {
            has_more: Some(total > values.len()),
            total: Some(total as i64),
            values,
        },
    })
}

/// Plugin suggestions, falling back to the operation list for `operation`.
fn complete_argument(plugin: &dyn SkyPlugin, name: &str, value: &str) -> Vec<String> {
    let values = plugin.completions(name, value);
    if !values.is_empty() || name != "operation" {
        return values;
    }
    plugin
        .supported_operations()
        .into_iter()
        .filter(|op| op.to_lowercase().starts_with(&value.to_lowercase()))
        .collect()
}
