//! Binds one connector to one dispatcher for a listen group.

use crate::config::Listen;
use crate::connector::Connector;
use crate::dispatcher::Dispatcher;
use crate::error::{ConnectorError, ListenError, ProcessError};
use crate::message::{InboundMessage, MessageHandler, OutboundResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Forwards connector callbacks into a dispatcher.
pub struct DispatchHandler {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl MessageHandler for DispatchHandler {
    async fn handle(&self, message: InboundMessage) -> Result<OutboundResult, ProcessError> {
        self.dispatcher.submit(message).await
    }
}

/// One connector, one dispatcher and the endpoints they serve.
pub struct Listener {
    config: Listen,
    connector: Box<dyn Connector>,
    dispatcher: Arc<Dispatcher>,
    prepared: bool,
}

impl Listener {
    pub fn new(config: Listen, connector: Box<dyn Connector>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            config,
            connector,
            dispatcher,
            prepared: false,
        }
    }

    /// Name of the connection this listener serves.
    pub fn source(&self) -> &str {
        &self.config.source
    }

    /// Register the endpoints on the connector.
    pub fn prepare(&mut self) -> Result<(), ListenError> {
        if self.prepared {
            return Ok(());
        }
        let handler = Arc::new(DispatchHandler::new(self.dispatcher.clone()));
        self.connector
            .set_endpoints(&self.config.endpoints, handler)
            .map_err(|error| self.error(error))?;
        self.prepared = true;
        Ok(())
    }

    /// Register endpoints, start the workers and connect.
    ///
    /// Returns when the connector's `connect` returns, which for HTTP is
    /// never under normal operation.
    pub async fn listen(&mut self) -> Result<(), ListenError> {
        self.prepare()?;
        self.dispatcher.run();

        info!(
            source = %self.config.source,
            protocol = %self.connector.protocol(),
            endpoints = self.config.endpoints.len(),
            "Listening"
        );
        let result = self.connector.connect().await;
        result.map_err(|error| self.error(error))
    }

    /// Stop the dispatcher workers.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
    }

    fn error(&self, error: ConnectorError) -> ListenError {
        ListenError {
            source_name: self.config.source.clone(),
            error,
        }
    }
}
