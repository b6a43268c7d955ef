// sky-server/src/message_handler.rs
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

use crate::rpc::{process_mcp_message, RpcContext};
use crate::traits::MessageHandler;

pub struct McpMessageHandler {
    ctx: Arc<RpcContext>,
}

impl McpMessageHandler {
    pub fn new(ctx: Arc<RpcContext>) -> Self {
        Self { ctx }
    }
}

impl MessageHandler for McpMessageHandler {
    fn handle_message<'a>(&'a self, message: String, client_id: String)
        -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        debug!("Processing message from client {}", client_id);
        Box::pin(async move { process_mcp_message(&message, &self.ctx).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin_registry::PluginRegistry;
    use sky_common::Provider;

    #[tokio::test]
    async fn answers_ping() {
        let ctx = RpcContext { registry: Arc::new(PluginRegistry::new()), provider: Provider::default() };
        let handler = McpMessageHandler::new(Arc::new(ctx));
        let reply = handler
            .handle_message(r#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#.to_string(), "test".to_string())
            .await
            .unwrap();
        assert_eq!(reply, r#"{"jsonrpc":"2.0","id":"a","result":{}}"#);
    }
}
