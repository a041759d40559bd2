//! Top-level wiring: one listener per listen group, each on its own task.

use crate::config::Suite;
use crate::connector::new_connector;
use crate::dispatcher::{Dispatcher, DispatcherSettings};
use crate::engine::MatchingEngine;
use crate::error::ListenError;
use crate::listener::Listener;
use anyhow::Context as _;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Owns every listener built from a suite.
pub struct Supervisor {
    listeners: Vec<Listener>,
}

impl Supervisor {
    /// Build and prepare all listeners. Any configuration error is fatal.
    pub fn new(suite: &Suite) -> anyhow::Result<Self> {
        suite.validate()?;

        let mut listeners = Vec::with_capacity(suite.listen.len());
        for listen in &suite.listen {
            let connection = suite
                .connection(&listen.source)
                .with_context(|| format!("Unknown connection {}", listen.source))?;
            let connector = new_connector(connection)
                .with_context(|| format!("Invalid connection {}", connection.name))?;

            let engine = Arc::new(MatchingEngine::new(&listen.endpoints));
            let dispatcher = Arc::new(Dispatcher::new(engine, DispatcherSettings::from(listen)));

            let mut listener = Listener::new(listen.clone(), connector, dispatcher);
            listener.prepare()?;
            listeners.push(listener);
        }

        for connection in &suite.connections {
            if !suite.listen.iter().any(|l| l.source == connection.name) {
                debug!(connection = %connection.name, "Connection has no listen group");
            }
        }

        Ok(Self { listeners })
    }

    /// Run every listener until `shutdown` resolves.
    ///
    /// Listeners whose connector returns from `connect` (queue transports)
    /// are kept alive; failed listeners are logged. Returns an error when no
    /// listener is left running.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut tasks: JoinSet<Result<Listener, ListenError>> = JoinSet::new();
        for mut listener in self.listeners {
            tasks.spawn(async move {
                listener.listen().await?;
                Ok(listener)
            });
        }

        let mut running = Vec::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                joined = tasks.join_next(), if !tasks.is_empty() => {
                    match joined {
                        Some(Ok(Ok(listener))) => {
                            info!(source = %listener.source(), "Listener connected");
                            running.push(listener);
                        }
                        Some(Ok(Err(e))) => error!(error = %e, "Listener failed"),
                        Some(Err(e)) => error!(error = %e, "Listener task aborted"),
                        None => {}
                    }
                    if tasks.is_empty() && running.is_empty() {
                        anyhow::bail!("No listener is running");
                    }
                }
            }
        }

        tasks.abort_all();
        for listener in &running {
            listener.shutdown();
        }
        Ok(())
    }
}
