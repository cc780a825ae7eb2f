//! Supervised background work for fire-and-forget metadata patches.
//!
//! Jobs run one at a time on a single worker in submission order. A job that
//! fails or panics is logged and broadcast as a [`TaskFailure`]; it never
//! takes the worker down.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};

type Job = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

enum Command {
    Run { name: String, job: Job },
    Flush(oneshot::Sender<()>),
}

/// A failed background job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Handle to the background worker. Cheap to clone.
#[derive(Clone)]
pub struct BackgroundTasks {
    tx: mpsc::UnboundedSender<Command>,
    failures: broadcast::Sender<TaskFailure>,
    counters: Arc<Counters>,
}

impl BackgroundTasks {
    /// Starts the worker. Must be called inside a Tokio runtime.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let (failures, _) = broadcast::channel(64);
        let counters = Arc::new(Counters::default());

        let failure_tx = failures.clone();
        let worker_counters = counters.clone();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Run { name, job } => {
                        let error = match tokio::spawn(job).await {
                            Ok(Ok(())) => None,
                            Ok(Err(e)) => Some(e),
                            Err(e) => Some(format!("task panicked: {e}")),
                        };
                        match error {
                            None => {
                                worker_counters.completed.fetch_add(1, Ordering::Relaxed);
                            }
                            Some(error) => {
                                worker_counters.failed.fetch_add(1, Ordering::Relaxed);
                                tracing::error!(task = %name, "background task failed: {}", error);
                                let _ = failure_tx.send(TaskFailure { task: name, error });
                            }
                        }
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            tracing::debug!("background task worker stopped");
        });

        Self {
            tx,
            failures,
            counters,
        }
    }

    /// Queues a job. Returns `false` if the worker is gone.
    pub fn submit<F>(&self, name: impl Into<String>, job: F) -> bool
    where
        F: Future<Output = Result<(), String>> + Send + 'static,
    {
        let name = name.into();
        if self
            .tx
            .send(Command::Run {
                name: name.clone(),
                job: Box::pin(job),
            })
            .is_err()
        {
            tracing::error!(task = %name, "background worker unavailable, task dropped");
            return false;
        }
        true
    }

    /// Waits until every job submitted before this call has finished.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Command::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Subscribes to failures of jobs submitted from now on.
    pub fn failures(&self) -> broadcast::Receiver<TaskFailure> {
        self.failures.subscribe()
    }

    pub fn completed(&self) -> u64 {
        self.counters.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.counters.failed.load(Ordering::Relaxed)
    }
}
