//! Bounded worker pool for story processing
//!
//! A fixed set of `W` worker tasks drains one shared `mpsc` queue of capacity `C`.
//! When the queue is full, [`BoundedDispatcher::submit`] parks the caller until a
//! slot frees up. The caller is the single delivery loop, so a full queue throttles
//! consumption from the broker instead of dropping work.
//!
//! Lifecycle:
//!
//! ```text
//! Running --(shutdown signal)--> Draining --(queue empty, workers idle)--> Stopped
//! ```
//!
//! Once shutdown is signalled, new submissions fail with
//! [`DispatchError::ShuttingDown`]; everything already accepted still runs.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::DispatchError;
use crate::metrics;
use crate::shutdown::Shutdown;

/// Unit of work executed by a worker
pub type Task = BoxFuture<'static, ()>;

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Task>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// Queued-but-unstarted task limit
    pub capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: 10,
            capacity: 100,
        }
    }
}

pub struct BoundedDispatcher {
    /// Master sender; taken on shutdown so the queue closes once drained
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    shutdown: Shutdown,
    state: watch::Sender<DispatcherState>,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    config: DispatcherConfig,
}

impl BoundedDispatcher {
    /// Spawn the worker pool and the shutdown supervisor.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: DispatcherConfig, shutdown: Shutdown) -> Arc<Self> {
        let config = DispatcherConfig {
            workers: config.workers.max(1),
            capacity: config.capacity.max(1),
        };

        let (sender, receiver) = mpsc::channel::<Task>(config.capacity);
        let (state, _) = watch::channel(DispatcherState::Running);

        let dispatcher = Arc::new(Self {
            sender: Mutex::new(Some(sender)),
            shutdown: shutdown.clone(),
            state,
            queued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            config,
        });

        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers: Vec<JoinHandle<()>> = (0..config.workers)
            .map(|worker_id| {
                let dispatcher = Arc::clone(&dispatcher);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move { dispatcher.worker_loop(worker_id, receiver).await })
            })
            .collect();

        tokio::spawn(Arc::clone(&dispatcher).supervise(shutdown, workers));

        info!(
            workers = config.workers,
            capacity = config.capacity,
            "Dispatcher started"
        );

        dispatcher
    }

    /// Enqueue `task`, waiting for a free slot while the queue is full.
    ///
    /// Returns `ShuttingDown` if shutdown was signalled before the task could be
    /// enqueued, including while this call was waiting for space.
    pub async fn submit<F>(&self, task: F) -> Result<(), DispatchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_triggered() {
            return Err(DispatchError::ShuttingDown);
        }
        let sender = self.sender().ok_or(DispatchError::ShuttingDown)?;

        let started = Instant::now();
        let mut shutdown = self.shutdown.clone();

        let permit = tokio::select! {
            biased;
            _ = shutdown.triggered() => return Err(DispatchError::ShuttingDown),
            permit = sender.reserve() => permit.map_err(|_| DispatchError::ShuttingDown)?,
        };

        self.mark_queued();
        permit.send(task.boxed());

        let waited = started.elapsed();
        metrics::observe_submit_wait(waited);
        if waited.as_millis() > 0 {
            debug!(waited_ms = waited.as_millis() as u64, "Submit waited for queue space");
        }

        Ok(())
    }

    /// Enqueue `task` only if a slot is free right now.
    pub fn try_submit<F>(&self, task: F) -> Result<(), DispatchError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown.is_triggered() {
            return Err(DispatchError::ShuttingDown);
        }
        let sender = self.sender().ok_or(DispatchError::ShuttingDown)?;

        let permit = sender.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => DispatchError::QueueFull,
            mpsc::error::TrySendError::Closed(()) => DispatchError::ShuttingDown,
        })?;

        self.mark_queued();
        permit.send(task.boxed());
        Ok(())
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    /// Wait until every worker has exited.
    pub async fn stopped(&self) {
        let mut state = self.state.subscribe();
        let _ = state
            .wait_for(|state| *state == DispatcherState::Stopped)
            .await;
    }

    /// Tasks accepted but not yet picked up by a worker
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Tasks currently executing
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    fn sender(&self) -> Option<mpsc::Sender<Task>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mark_queued(&self) {
        let depth = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_queue_depth(depth);
    }

    async fn worker_loop(&self, worker_id: usize, receiver: SharedReceiver) {
        debug!(worker = worker_id, "Worker started");

        loop {
            // Only one idle worker waits on the queue at a time; the rest wait on the lock.
            let next = {
                let mut receiver = receiver.lock().await;
                receiver.recv().await
            };

            let Some(task) = next else {
                break;
            };

            let depth = self.queued.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
            metrics::set_queue_depth(depth);

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            metrics::task_started();

            if AssertUnwindSafe(task).catch_unwind().await.is_err() {
                error!(worker = worker_id, "Task panicked; worker continues");
            }

            metrics::task_finished();
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        debug!(worker = worker_id, "Worker stopped (queue closed)");
    }

    async fn supervise(self: Arc<Self>, mut shutdown: Shutdown, workers: Vec<JoinHandle<()>>) {
        shutdown.triggered().await;

        self.state.send_replace(DispatcherState::Draining);
        info!(
            queued = self.queued(),
            in_flight = self.in_flight(),
            "Dispatcher draining"
        );

        // Dropping the master sender closes the queue once in-progress submits let go.
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker task failed");
            }
        }

        self.state.send_replace(DispatcherState::Stopped);
        info!("Dispatcher stopped");
    }
}
