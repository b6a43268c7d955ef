// sky-client/src/main.rs
use clap::{Parser, Subcommand, ValueEnum};
use futures::{SinkExt, StreamExt};
use rand::Rng;
use reqwest::{header::CONTENT_TYPE, Client as ReqwestClient};
use serde_json::{json, Map, Value};
use sky_common::{
    CallToolResult, CompleteResult, DiscoveryResponse, Implementation, InitializeParams, InitializeResult,
    ListToolsResult, MCPRequest, MCPResponse, ReadResourceResult, ContentItem, MCP_PROTOCOL_VERSION,
    MCP_SESSION_ID_HEADER,
};
use std::error::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

type BoxedError = Box<dyn Error + Send + Sync>;

#[derive(Parser)]
#[command(author, version, about = "Command line client for the sky MCP server", long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(short = 'u', long, default_value = "http://localhost:3001")]
    base_url: String,
    #[arg(short, long, value_enum, default_value_t = Transport::Http)]
    transport: Transport,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    /// Streamable HTTP on /mcp
    Http,
    /// WebSocket on /mcpi
    Ws,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the provider and its tools from the discovery endpoint
    Discover,
    /// List tools with their operations
    Tools,
    /// Call a tool, e.g. `call metar code=LOWG` or `call Local -o SUN query=Graz`
    Call {
        tool: String,
        #[arg(short, long)]
        operation: Option<String>,
        /// Arguments as key=value; values are read as JSON when they parse
        args: Vec<String>,
    },
    /// Load a fragment such as `metar:LOWG`
    Fragment { spec: String },
    /// Complete an argument value
    Complete { tool: String, param: String, prefix: String },
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), BoxedError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let base_url = cli.base_url.trim_end_matches('/').to_string();

    if let Commands::Discover = cli.command {
        return discover(&base_url).await;
    }

    let mut conn = Connection::open(&base_url, cli.transport).await?;
    let outcome = run_command(&mut conn, cli.command).await;
    conn.close().await;
    outcome
}

async fn run_command(conn: &mut Connection, command: Commands) -> Result<(), BoxedError> {
    match command {
        Commands::Discover => Ok(()),
        Commands::Tools => {
            let tools: ListToolsResult = serde_json::from_value(conn.request("tools/list", None).await?)?;
            for tool in tools.tools {
                println!("{}: {}", tool.name, tool.description.unwrap_or_default());
                if let Some(ops) = tool.input_schema.pointer("/properties/operation/enum").and_then(Value::as_array) {
                    let ops: Vec<&str> = ops.iter().filter_map(Value::as_str).collect();
                    println!("    operations: {}", ops.join(", "));
                }
            }
            Ok(())
        }
        Commands::Call { tool, operation, args } => {
            let mut arguments = parse_kv(&args)?;
            if let Some(op) = operation {
                arguments.insert("operation".to_string(), Value::String(op));
            }
            let params = json!({ "name": tool, "arguments": arguments });
            let result: CallToolResult = serde_json::from_value(conn.request("tools/call", Some(params)).await?)?;
            print_content(&result.content);
            if result.is_error {
                return Err(format!("tool '{}' reported an error", tool).into());
            }
            Ok(())
        }
        Commands::Fragment { spec } => {
            let (loader, argument) = parse_fragment(&spec)?;
            let uri = format!("{}:{}", loader, argument);
            let result: ReadResourceResult = serde_json::from_value(conn.request("resources/read", Some(json!({ "uri": uri }))).await?)?;
            for contents in result.contents {
                println!("{}", contents.text);
            }
            Ok(())
        }
        Commands::Complete { tool, param, prefix } => {
            let params = json!({
                "ref": { "type": "ref/tool", "name": tool },
                "argument": { "name": param, "value": prefix }
            });
            let result: CompleteResult = serde_json::from_value(conn.request("completion/complete", Some(params)).await?)?;
            for value in result.completion.values {
                println!("{}", value);
            }
            Ok(())
        }
        Commands::Ping => {
            conn.request("ping", None).await?;
            println!("pong");
            Ok(())
        }
    }
}

fn print_content(content: &[ContentItem]) {
    for item in content {
        match item {
            ContentItem::Text { text, .. } => println!("{}", text),
            ContentItem::Resource { resource, .. } => println!("{}", resource.text),
        }
    }
}

async fn discover(base_url: &str) -> Result<(), BoxedError> {
    let url = format!("{}/mcpi/discover", base_url);
    info!("Discovering {}", url);
    let response = ReqwestClient::new().get(&url).send().await?.error_for_status()?;
    let discovery: DiscoveryResponse = response.json().await?;
    println!("Provider: {} ({})", discovery.provider.name, discovery.provider.domain);
    println!("{}", discovery.provider.description);
    for cap in &discovery.capabilities {
        println!("  - {} [{}]: {}", cap.name, cap.category, cap.description);
        println!("    Ops: {}", cap.operations.join(", "));
    }
    Ok(())
}

// --- Argument parsing ---

/// `key=value` pairs into a JSON object. `radius_km=50` becomes a number,
/// `query=Graz` stays a string.
fn parse_kv(args: &[String]) -> Result<Map<String, Value>, BoxedError> {
    let mut map = Map::new();
    for arg in args {
        let (key, raw) = arg
            .split_once('=')
            .ok_or_else(|| format!("argument '{}' is not key=value", arg))?;
        if key.is_empty() {
            return Err(format!("argument '{}' has an empty key", arg).into());
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

/// Splits `loader:argument`, e.g. `metar:LOWG`.
fn parse_fragment(spec: &str) -> Result<(&str, &str), BoxedError> {
    match spec.split_once(':') {
        Some((loader, argument)) if !loader.is_empty() && !argument.is_empty() => Ok((loader, argument)),
        _ => Err(format!("fragment '{}' must look like loader:argument (e.g. metar:LOWG)", spec).into()),
    }
}

fn ws_url(base_url: &str) -> String {
    if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}/mcpi", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}/mcpi", rest)
    } else {
        format!("{}/mcpi", base_url)
    }
}

// --- Transports ---

enum Connection {
    Http { client: ReqwestClient, mcp_url: String, session_id: Option<String> },
    Ws { stream: WebSocketStream<MaybeTlsStream<TcpStream>> },
}

impl Connection {
    /// Connects and performs the `initialize` handshake.
    async fn open(base_url: &str, transport: Transport) -> Result<Self, BoxedError> {
        let mut conn = match transport {
            Transport::Http => Connection::Http {
                client: ReqwestClient::new(),
                mcp_url: format!("{}/mcp", base_url),
                session_id: None,
            },
            Transport::Ws => {
                let url = ws_url(base_url);
                info!("Connecting to {}", url);
                let (stream, _) = connect_async(url.as_str()).await?;
                Connection::Ws { stream }
            }
        };

        let params = InitializeParams {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: Default::default(),
            client_info: Implementation { name: "sky-client".to_string(), version: env!("CARGO_PKG_VERSION").to_string() },
        };
        let result: InitializeResult = serde_json::from_value(conn.request("initialize", Some(serde_json::to_value(params)?)).await?)?;
        debug!("Connected to {} {} (protocol {})", result.server_info.name, result.server_info.version, result.protocol_version);
        conn.notify("notifications/initialized").await?;
        Ok(conn)
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, BoxedError> {
        let id: u32 = rand::thread_rng().gen();
        let payload = serde_json::to_string(&MCPRequest::new(id, method, params))?;
        let text = self.exchange(payload).await?.ok_or("server sent no response")?;
        let response: MCPResponse = serde_json::from_str(&text)?;
        if let Some(err) = response.error {
            return Err(format!("{} ({})", err.message, err.code).into());
        }
        response.result.ok_or_else(|| "response carries neither result nor error".into())
    }

    async fn notify(&mut self, method: &str) -> Result<(), BoxedError> {
        let payload = json!({ "jsonrpc": "2.0", "method": method }).to_string();
        // WebSocket notifications get no frame back, so do not wait for one
        if let Connection::Ws { stream } = self {
            stream.send(Message::text(payload)).await?;
            return Ok(());
        }
        self.exchange(payload).await?;
        Ok(())
    }

    async fn exchange(&mut self, payload: String) -> Result<Option<String>, BoxedError> {
        match self {
            Connection::Http { client, mcp_url, session_id } => {
                let mut request = client.post(mcp_url.as_str()).header(CONTENT_TYPE, "application/json").body(payload);
                if let Some(sid) = session_id.as_deref() {
                    request = request.header(MCP_SESSION_ID_HEADER, sid);
                }
                let response = request.send().await?.error_for_status()?;
                if let Some(sid) = response.headers().get(MCP_SESSION_ID_HEADER).and_then(|v| v.to_str().ok()) {
                    debug!("Session {}", sid);
                    *session_id = Some(sid.to_string());
                }
                if response.status() == reqwest::StatusCode::NO_CONTENT {
                    return Ok(None);
                }
                Ok(Some(response.text().await?))
            }
            Connection::Ws { stream } => {
                stream.send(Message::text(payload)).await?;
                while let Some(msg) = stream.next().await {
                    match msg? {
                        Message::Text(text) => return Ok(Some(text.to_string())),
                        Message::Close(_) => break,
                        _ => continue,
                    }
                }
                Err("WebSocket closed before a response arrived".into())
            }
        }
    }

    async fn close(self) {
        match self {
            Connection::Http { client, mcp_url, session_id: Some(sid) } => {
                if let Err(e) = client.delete(mcp_url.as_str()).header(MCP_SESSION_ID_HEADER, sid).send().await {
                    debug!("Session cleanup failed: {}", e);
                }
            }
            Connection::Http { .. } => {}
            Connection::Ws { mut stream } => {
                if let Err(e) = stream.close(None).await {
                    debug!("WebSocket close failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn key_values_become_json() {
        let map = parse_kv(&args(&["query=Graz", "radius_km=50", "latitude=47.07", "flag=true", "code=\"0042\""])).unwrap();
        assert_eq!(map["query"], json!("Graz"));
        assert_eq!(map["radius_km"], json!(50));
        assert_eq!(map["latitude"], json!(47.07));
        assert_eq!(map["flag"], json!(true));
        assert_eq!(map["code"], json!("0042"));
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let map = parse_kv(&args(&["query=a=b"])).unwrap();
        assert_eq!(map["query"], json!("a=b"));
        assert!(parse_kv(&args(&["novalue"])).is_err());
        assert!(parse_kv(&args(&["=x"])).is_err());
    }

    #[test]
    fn fragments_need_loader_and_argument() {
        assert_eq!(parse_fragment("metar:LOWG").unwrap(), ("metar", "LOWG"));
        assert!(parse_fragment("LOWG").is_err());
        assert!(parse_fragment("metar:").is_err());
    }

    #[test]
    fn websocket_url_follows_the_scheme() {
        assert_eq!(ws_url("http://localhost:3001"), "ws://localhost:3001/mcpi");
        assert_eq!(ws_url("https://sky.example.at"), "wss://sky.example.at/mcpi");
    }

    #[test]
    fn cli_parses_calls() {
        let cli = Cli::try_parse_from(["sky-client", "-t", "ws", "call", "Local", "-o", "SUN", "query=Graz"]).unwrap();
        assert_eq!(cli.transport, Transport::Ws);
        match cli.command {
            Commands::Call { tool, operation, args } => {
                assert_eq!(tool, "Local");
                assert_eq!(operation.as_deref(), Some("SUN"));
                assert_eq!(args, vec!["query=Graz"]);
            }
            _ => panic!("expected a call"),
        }
    }
}
