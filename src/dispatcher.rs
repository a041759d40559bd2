//! Worker pool between connectors and the matching engine.
//!
//! Callers submit a message and wait on a oneshot channel created for that
//! message alone; a fixed set of workers drains one shared bounded queue.

use crate::config::Listen;
use crate::engine::MatchingEngine;
use crate::error::ProcessError;
use crate::message::{InboundMessage, OutboundResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Tunables of a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherSettings {
    /// Number of workers
    pub workers: usize,
    /// Maximum number of queued requests
    pub queue_capacity: usize,
    /// Bounded wait for a response (`None` waits forever)
    pub timeout: Option<Duration>,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            queue_capacity: 1024,
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl From<&Listen> for DispatcherSettings {
    fn from(listen: &Listen) -> Self {
        Self {
            workers: listen.workers,
            queue_capacity: listen.queue_capacity,
            timeout: listen.timeout(),
        }
    }
}

type Outcome = Result<OutboundResult, ProcessError>;

/// A queued request with its response channel.
struct Job {
    message: InboundMessage,
    respond_to: oneshot::Sender<Outcome>,
}

type SharedQueue = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Bounded pool of workers evaluating messages against one rule table.
pub struct Dispatcher {
    settings: DispatcherSettings,
    engine: Arc<MatchingEngine>,
    sender: mpsc::Sender<Job>,
    queue: StdMutex<Option<mpsc::Receiver<Job>>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    busy: Arc<AtomicUsize>,
}

impl Dispatcher {
    /// Create a dispatcher. Workers start on [`Dispatcher::run`].
    pub fn new(engine: Arc<MatchingEngine>, settings: DispatcherSettings) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        Self {
            settings,
            engine,
            sender,
            queue: StdMutex::new(Some(receiver)),
            workers: StdMutex::new(Vec::new()),
            busy: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start the workers. Only the first call has an effect.
    pub fn run(&self) {
        let receiver = match self.queue.lock() {
            Ok(mut queue) => queue.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(receiver) = receiver else {
            return;
        };

        let shared: SharedQueue = Arc::new(Mutex::new(receiver));
        let handles: Vec<_> = (0..self.settings.workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    shared.clone(),
                    self.engine.clone(),
                    self.busy.clone(),
                ))
            })
            .collect();

        info!(workers = handles.len(), "Dispatcher workers started");
        match self.workers.lock() {
            Ok(mut workers) => workers.extend(handles),
            Err(poisoned) => poisoned.into_inner().extend(handles),
        }
    }

    /// Number of workers currently evaluating a message.
    pub fn busy_workers(&self) -> usize {
        self.busy.load(Ordering::Relaxed)
    }

    /// Queue a message and wait for its response.
    ///
    /// Fails fast with [`ProcessError::Overloaded`] when the queue is full and
    /// with [`ProcessError::Timeout`] when no worker answers in time.
    pub async fn submit(&self, message: InboundMessage) -> Outcome {
        let (respond_to, response) = oneshot::channel();
        let job = Job { message, respond_to };

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(
                    busy = self.busy_workers(),
                    workers = self.settings.workers,
                    capacity = self.settings.queue_capacity,
                    "Request queue full"
                );
                ProcessError::Overloaded
            }
            mpsc::error::TrySendError::Closed(_) => ProcessError::WorkerUnavailable,
        })?;

        let received = match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, response)
                .await
                .map_err(|_| ProcessError::Timeout(limit))?,
            None => response.await,
        };
        received.map_err(|_| ProcessError::WorkerUnavailable)?
    }

    /// Stop all workers. Queued and in-flight requests are abandoned.
    pub fn shutdown(&self) {
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in &handles {
            handle.abort();
        }
        if !handles.is_empty() {
            info!(workers = handles.len(), "Dispatcher workers stopped");
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn worker_loop(
    id: usize,
    queue: SharedQueue,
    engine: Arc<MatchingEngine>,
    busy: Arc<AtomicUsize>,
) {
    loop {
        // the lock is held only while waiting, never while processing
        let job = { queue.lock().await.recv().await };
        let Some(job) = job else {
            debug!(worker = id, "Request queue closed");
            return;
        };

        busy.fetch_add(1, Ordering::Relaxed);
        trace!(worker = id, endpoint = %job.message.endpoint, "Processing request");
        let outcome = engine.respond(&job.message);
        busy.fetch_sub(1, Ordering::Relaxed);

        if job.respond_to.send(outcome).is_err() {
            debug!(worker = id, "Caller stopped waiting for response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use crate::error::MatchError;
    use crate::message::Context;
    use tokio_test::assert_err;

    fn engine() -> Arc<MatchingEngine> {
        let endpoint: Endpoint = serde_yaml::from_str(
            r#"
name: echo
tests:
  - when:
      id: 1
    then:
      response: one
  - when:
      id: 2
    then:
      response: two
  - when:
      id: 3
    then:
      response: three
"#,
        )
        .unwrap();
        Arc::new(MatchingEngine::new(&[endpoint]))
    }

    fn message(id: u32) -> InboundMessage {
        InboundMessage::new("echo", format!(r#"{{"id":{id}}}"#), Context::new())
    }

    #[tokio::test]
    async fn test_submit_returns_result() {
        let dispatcher = Dispatcher::new(engine(), DispatcherSettings::default());
        dispatcher.run();
        let out = dispatcher.submit(message(2)).await.unwrap();
        assert_eq!(&out.content[..], b"two");
    }

    #[tokio::test]
    async fn test_submit_propagates_no_match() {
        let dispatcher = Dispatcher::new(engine(), DispatcherSettings::default());
        dispatcher.run();
        let err = dispatcher.submit(message(9)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Match(MatchError::NoSuitableRule(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_get_their_own_response() {
        let settings = DispatcherSettings {
            workers: 3,
            ..Default::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(engine(), settings));
        dispatcher.run();

        let mut tasks = Vec::new();
        for i in 0..300u32 {
            let dispatcher = dispatcher.clone();
            let id = i % 3 + 1;
            tasks.push(tokio::spawn(async move {
                (id, dispatcher.submit(message(id)).await)
            }));
        }

        for task in tasks {
            let (id, result) = task.await.unwrap();
            let expected: &[u8] = match id {
                1 => b"one",
                2 => b"two",
                _ => b"three",
            };
            assert_eq!(&result.unwrap().content[..], expected);
        }
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let dispatcher = Dispatcher::new(engine(), DispatcherSettings::default());
        dispatcher.run();
        dispatcher.run();
        assert_eq!(dispatcher.workers.lock().unwrap().len(), 1);
        assert!(dispatcher.submit(message(1)).await.is_ok());
        assert_eq!(dispatcher.busy_workers(), 0);
    }

    #[tokio::test]
    async fn test_timeout_without_workers() {
        let settings = DispatcherSettings {
            timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(engine(), settings);
        let err = dispatcher.submit(message(1)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_full_queue_is_overloaded() {
        let settings = DispatcherSettings {
            workers: 1,
            queue_capacity: 1,
            timeout: Some(Duration::from_millis(200)),
        };
        let dispatcher = Arc::new(Dispatcher::new(engine(), settings));

        // no workers running, so the first request occupies the only slot
        let first = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.submit(message(1)).await })
        };
        tokio::task::yield_now().await;
        while dispatcher.sender.capacity() > 0 {
            tokio::task::yield_now().await;
        }

        let err = dispatcher.submit(message(2)).await.unwrap_err();
        assert!(matches!(err, ProcessError::Overloaded));
        assert_eq!(dispatcher.busy_workers(), 0);

        dispatcher.run();
        let first = first.await.unwrap();
        assert_eq!(&first.unwrap().content[..], b"one");
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_requests() {
        let settings = DispatcherSettings {
            timeout: None,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(engine(), settings);
        dispatcher.run();
        dispatcher.shutdown();
        assert_err!(dispatcher.submit(message(1)).await);
    }
}
