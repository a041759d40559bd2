//! Error types for routing, matching, dispatch and transports.
//!
//! Configuration problems are reported through `anyhow` by the config layer;
//! everything that can happen per message or per connector lives here.

use std::time::Duration;
use thiserror::Error;

/// Failure to turn bytes into a [`Value`](crate::value::Value) or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML payload: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Route registration failures. These are configuration errors.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("duplicate path {path} for method {method}")]
    Duplicate { method: String, path: String },
    #[error("path template {path} repeats parameter {param}")]
    RepeatedParam { path: String, param: String },
    #[error("invalid route pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Outcome of rule selection when no rule can be returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("endpoint {0} not found")]
    EndpointNotFound(String),
    #[error("no suitable rule for endpoint {0}")]
    NoSuitableRule(String),
}

/// A processing failure surfaced to the transport for one message.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("failed to decode request for endpoint {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: CodecError,
    },
    #[error("failed to encode response for endpoint {endpoint}: {source}")]
    Encode {
        endpoint: String,
        #[source]
        source: CodecError,
    },
    #[error("request queue is full")]
    Overloaded,
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("dispatcher workers are unavailable")]
    WorkerUnavailable,
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("endpoint {endpoint} is missing required field {field}")]
    MissingField {
        endpoint: String,
        field: &'static str,
    },
    #[error("duplicate queue {0}")]
    DuplicateQueue(String),
    #[error("endpoints cannot change once the connector is connected")]
    AlreadyConnected,
    #[error("connect called before endpoints were set")]
    NoEndpoints,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),
}

/// Failure of a listener to register endpoints or connect.
#[derive(Debug, Error)]
#[error("listener for {source_name} failed: {error}")]
pub struct ListenError {
    pub source_name: String,
    #[source]
    pub error: ConnectorError,
}
