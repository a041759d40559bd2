//! Suite configuration.
//!
//! A suite names the transports to bind (connections) and, per transport,
//! the endpoints to emulate together with their rules.

use crate::codec::Codec;
use crate::value::Value;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File every suite directory must contain.
pub const MAIN_SUITE_FILE: &str = "main.yml";

/// Full mock configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Suite {
    /// Transport bindings
    #[serde(default)]
    pub connections: Vec<Connection>,

    /// Endpoint groups, one per connection
    #[serde(default)]
    pub listen: Vec<Listen>,
}

impl Suite {
    /// Load the suite stored in a directory.
    ///
    /// `main.yml` is read first; every other `*.yml` / `*.yaml` file in the
    /// directory is merged in after it, in file name order.
    pub fn load(work_dir: &Path) -> anyhow::Result<Self> {
        let main = work_dir.join(MAIN_SUITE_FILE);
        let mut suite = Self::from_file(&main)?;

        for path in extra_suite_files(work_dir)? {
            let part = Self::from_file(&path)?;
            suite.connections.extend(part.connections);
            suite.listen.extend(part.listen);
        }

        suite.validate()?;
        Ok(suite)
    }

    /// Parse one suite file without validating it.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suite file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse suite file {}", path.display()))
    }

    /// Parse and validate a suite from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let suite: Self = serde_yaml::from_str(yaml)?;
        suite.validate()?;
        Ok(suite)
    }

    /// Find a connection by name.
    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Validate the suite.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for connection in &self.connections {
            if connection.name.is_empty() {
                anyhow::bail!("Connection name cannot be empty");
            }
            if !names.insert(connection.name.as_str()) {
                anyhow::bail!("Duplicate connection name: {}", connection.name);
            }
        }

        let mut sources = HashSet::new();
        for listen in &self.listen {
            let connection = self.connection(&listen.source).ok_or_else(|| {
                anyhow::anyhow!("Listen source {} names no connection", listen.source)
            })?;
            if !sources.insert(listen.source.as_str()) {
                anyhow::bail!(
                    "Connection {} is the source of more than one listen group",
                    listen.source
                );
            }
            listen
                .validate(connection.protocol)
                .map_err(|e| anyhow::anyhow!("Listen {}: {}", listen.source, e))?;
        }
        Ok(())
    }
}

fn extra_suite_files(work_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(work_dir)
        .with_context(|| format!("Failed to read suite directory {}", work_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        let is_main = path.file_name().and_then(|n| n.to_str()) == Some(MAIN_SUITE_FILE);
        if is_yaml && !is_main && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Supported transport protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Amqp,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Amqp => f.write_str("amqp"),
        }
    }
}

/// A named transport binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Connection {
    /// Unique name, referenced by `listen[].source`
    pub name: String,

    /// Transport protocol
    pub protocol: Protocol,

    /// Host to bind (HTTP) or broker host (AMQP)
    #[serde(default = "default_host")]
    pub host: String,

    /// Port
    pub port: u16,

    /// Broker login
    #[serde(default)]
    pub login: String,

    /// Broker password
    #[serde(default)]
    pub password: String,

    /// Protocol specific properties
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Connection {
    /// Parse a numeric property, falling back to `default` when absent.
    pub fn numeric_property<T: std::str::FromStr>(&self, key: &str, default: T) -> anyhow::Result<T> {
        match self.string_property(key) {
            Some(raw) => raw.trim().parse().map_err(|_| {
                anyhow::anyhow!("Connection {}: property {} is not a number: {}", self.name, key, raw)
            }),
            None => Ok(default),
        }
    }

    /// A property rendered as a string.
    pub fn string_property(&self, key: &str) -> Option<String> {
        self.properties.get(key).map(Value::canonical_string)
    }
}

/// Binds one connection to the endpoints it serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Listen {
    /// Connection name
    pub source: String,

    /// Number of dispatcher workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of requests waiting for a worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// How long a caller waits for a response (0 = forever)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Emulated endpoints
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

fn default_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Listen {
    /// Bounded wait for a response, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    /// Validate the listen group against the protocol of its source.
    pub fn validate(&self, protocol: Protocol) -> anyhow::Result<()> {
        if self.workers == 0 {
            anyhow::bail!("workers must be at least 1");
        }
        if self.queue_capacity == 0 {
            anyhow::bail!("queueCapacity must be at least 1");
        }

        let mut names = HashSet::new();
        for endpoint in &self.endpoints {
            if endpoint.name.is_empty() {
                anyhow::bail!("Endpoint name cannot be empty");
            }
            if !names.insert(endpoint.name.as_str()) {
                anyhow::bail!("Duplicate endpoint name: {}", endpoint.name);
            }
            endpoint
                .validate(protocol)
                .map_err(|e| anyhow::anyhow!("Endpoint {}: {}", endpoint.name, e))?;
        }
        Ok(())
    }
}

/// An emulated route: HTTP method and URL, or a queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct Endpoint {
    /// Logical name
    pub name: String,

    /// HTTP path template, e.g. `/users/{id}`
    #[serde(default)]
    pub url: String,

    /// HTTP method
    #[serde(default)]
    pub method: String,

    /// AMQP exchange to bind the queue to
    #[serde(default)]
    pub exchange: String,

    /// AMQP routing key for the exchange binding
    #[serde(default)]
    pub routing_key: String,

    /// AMQP queue to consume
    #[serde(default)]
    pub queue: String,

    /// Payload format
    #[serde(default)]
    pub format: Codec,

    /// Rules, evaluated top to bottom
    #[serde(default)]
    pub tests: Vec<Rule>,
}

impl Endpoint {
    /// Validate transport specific fields.
    pub fn validate(&self, protocol: Protocol) -> anyhow::Result<()> {
        match protocol {
            Protocol::Http => {
                if self.url.is_empty() {
                    anyhow::bail!("HTTP endpoint requires url");
                }
                if self.method.is_empty() {
                    anyhow::bail!("HTTP endpoint requires method");
                }
            }
            Protocol::Amqp => {
                if self.queue.is_empty() {
                    anyhow::bail!("AMQP endpoint requires queue");
                }
            }
        }
        for (i, rule) in self.tests.iter().enumerate() {
            rule.validate()
                .map_err(|e| anyhow::anyhow!("Rule {}: {}", i, e))?;
        }
        Ok(())
    }
}

/// A condition and the response it selects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    /// Field name to expected value; absent means always
    #[serde(default)]
    pub when: Option<Value>,

    /// Action taken when the condition holds
    #[serde(default)]
    pub then: Action,
}

impl Rule {
    /// Validate the condition shape.
    pub fn validate(&self) -> anyhow::Result<()> {
        match &self.when {
            None | Some(Value::Null) | Some(Value::Mapping(_)) => Ok(()),
            Some(other) => anyhow::bail!("when must be a mapping, got {}", other),
        }
    }
}

/// Canned response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    /// Payload to send back
    #[serde(default)]
    pub response: Option<Value>,

    /// Reply headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
}
