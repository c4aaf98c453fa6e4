//! Renderer -> host command gateway.
//!
//! `invoke` checks the name against the registry before anything else. A name
//! that is not invocable is rejected here and never reaches a `HostHandler`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::channels::{ChannelRegistry, InvokeChannel};
use crate::error::IpcError;

/// Privileged host-side code behind one or more invocation channels.
#[async_trait]
pub trait HostHandler: Send + Sync {
    async fn handle(&self, channel: InvokeChannel, args: Vec<Value>) -> Result<Value, IpcError>;
}

pub struct CommandGateway {
    registry: Arc<ChannelRegistry>,
    handlers: HashMap<InvokeChannel, Arc<dyn HostHandler>>,
}

impl CommandGateway {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            handlers: HashMap::new(),
        }
    }

    /// Route `channel` to `handler`, replacing any previous route.
    pub fn with_handler(mut self, channel: InvokeChannel, handler: Arc<dyn HostHandler>) -> Self {
        self.handlers.insert(channel, handler);
        self
    }

    /// Route every invocable channel of the registry to `handler`.
    pub fn with_handler_for_all(mut self, handler: Arc<dyn HostHandler>) -> Self {
        for channel in InvokeChannel::ALL {
            if self.registry.is_invocable(channel.as_str()) {
                self.handlers.insert(channel, Arc::clone(&handler));
            }
        }
        self
    }

    /// Forward `args` to the handler for `name` and return its result as-is.
    ///
    /// Each call is independent: the gateway adds no ordering or locking
    /// between concurrent invocations.
    pub async fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value, IpcError> {
        let Some(channel) = self.registry.invoke_channel(name) else {
            tracing::warn!("Invalid invoke channel: {}", name);
            return Err(IpcError::RejectedChannel(name.to_string()));
        };

        let handler = self
            .handlers
            .get(&channel)
            .ok_or_else(|| IpcError::Unhandled(channel.as_str().to_string()))?;

        tracing::debug!(channel = %channel, args = args.len(), "Forwarding invocation");
        handler.handle(channel, args).await
    }
}
