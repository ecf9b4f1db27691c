//! Delivery sinks for outbound notifications.

pub mod webhook;

use async_trait::async_trait;
use roster_watch::Message;

use crate::error::DeliveryResult;

pub use webhook::WebhookSink;

/// Delivers one notification. Best effort: callers log failures and move on.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send(&self, message: &Message) -> DeliveryResult<()>;
}
