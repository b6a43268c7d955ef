// sky-server/src/traits.rs
use std::future::Future;
use std::pin::Pin;

/// A transport hands each inbound frame to a `MessageHandler` and writes back
/// whatever it returns. `None` means the frame needs no answer.
pub trait MessageHandler: Send + Sync {
    fn handle_message<'a>(&'a self, message: String, client_id: String)
        -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;
}
