//! Transport connectors.
//!
//! A connector binds one configured connection, receives messages for the
//! endpoints registered on it and hands each one to a [`MessageHandler`].
//! Endpoints are registered once, before [`Connector::connect`].
//!
//! [`MessageHandler`]: crate::message::MessageHandler

pub mod amqp;
pub mod http;

pub use amqp::AmqpConnector;
pub use http::HttpConnector;

use crate::config::{Connection, Endpoint, Protocol};
use crate::error::ConnectorError;
use crate::message::SharedHandler;
use async_trait::async_trait;

/// Capability contract shared by all transports.
#[async_trait]
pub trait Connector: Send {
    /// Protocol served by this connector.
    fn protocol(&self) -> Protocol;

    /// Register the endpoints to serve and the callback to invoke.
    ///
    /// Fails with [`ConnectorError::AlreadyConnected`] once `connect` ran.
    fn set_endpoints(
        &mut self,
        endpoints: &[Endpoint],
        handler: SharedHandler,
    ) -> Result<(), ConnectorError>;

    /// Bind the transport and start receiving.
    ///
    /// Request/response transports serve until the process ends; queue
    /// transports return once their consumers are running.
    async fn connect(&mut self) -> Result<(), ConnectorError>;
}

/// Build the connector for a configured connection.
pub fn new_connector(connection: &Connection) -> anyhow::Result<Box<dyn Connector>> {
    Ok(match connection.protocol {
        Protocol::Http => Box::new(HttpConnector::new(connection)?),
        Protocol::Amqp => Box::new(AmqpConnector::new(connection)?),
    })
}
