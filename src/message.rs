//! Envelopes exchanged between connectors and the dispatcher.

use crate::error::ProcessError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

/// Side-channel values of a message (path parameters, headers, ...).
pub type Context = HashMap<String, String>;

/// A message received by a connector.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    /// Logical endpoint name
    pub endpoint: String,
    /// Raw body
    pub content: Bytes,
    /// Side-channel values
    pub context: Context,
}

impl InboundMessage {
    pub fn new(endpoint: impl Into<String>, content: impl Into<Bytes>, context: Context) -> Self {
        Self {
            endpoint: endpoint.into(),
            content: content.into(),
            context,
        }
    }
}

/// Response produced for an inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundResult {
    /// Response body
    pub content: Bytes,
    /// Reply metadata (e.g. HTTP headers)
    pub context: Context,
}

/// Callback a connector invokes once per inbound message.
///
/// May be called concurrently and may block for as long as matching takes.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: InboundMessage) -> Result<OutboundResult, ProcessError>;
}

/// Shared handle to a [`MessageHandler`].
pub type SharedHandler = Arc<dyn MessageHandler>;
