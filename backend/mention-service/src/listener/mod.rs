//! Inbound message delivery
//!
//! An [`EventListener`] owns the subscription and hands every raw payload to one
//! [`MessageHandler`]. Handlers are invoked sequentially from a single delivery
//! loop, so a handler that waits (e.g. on a full dispatch queue) throttles
//! consumption.

pub mod kafka;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{DispatchError, ListenerError};
use crate::shutdown::Shutdown;

pub use kafka::{KafkaListenerConfig, KafkaStoryListener};

/// Receiver of raw inbound messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Accept one payload. `ShuttingDown` tells the listener to stop delivering.
    async fn on_message(&self, payload: Vec<u8>) -> Result<(), DispatchError>;
}

/// Message bus subscription
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Deliver messages to `handler` until `shutdown` fires, then unsubscribe
    /// and return.
    async fn listen(
        &self,
        handler: Arc<dyn MessageHandler>,
        shutdown: Shutdown,
    ) -> Result<(), ListenerError>;
}
