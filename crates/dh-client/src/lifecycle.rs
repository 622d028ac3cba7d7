//! Service lifecycle - stop signal, worker join set, idempotent shutdown.
//!
//! Every background worker a service starts goes through [`Lifecycle::spawn`]
//! and watches a [`StopSignal`]. [`Lifecycle::shutdown`] runs the stop
//! sequence once; concurrent callers wait for that one run to finish, so
//! every caller returns only after all workers have exited.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

use crate::domain::error::{ClientError, ClientResult};

/// Receiving side of the service-wide stop broadcast.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested.
    pub async fn stopped(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // lifecycle dropped
                return;
            }
        }
    }
}

/// Owner of the stop flag and of every spawned worker.
pub struct Lifecycle {
    name: &'static str,
    stopped: AtomicBool,
    signal: watch::Sender<bool>,
    finished: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Lifecycle {
    /// `name` labels the service in logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stopped: AtomicBool::new(false),
            signal: watch::channel(false).0,
            finished: watch::channel(false).0,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// `Err(Stopped)` once stop has begun.
    pub fn ensure_running(&self) -> ClientResult<()> {
        if self.is_stopped() {
            Err(ClientError::Stopped)
        } else {
            Ok(())
        }
    }

    pub fn signal(&self) -> StopSignal {
        StopSignal {
            rx: self.signal.subscribe(),
        }
    }

    /// Starts a worker that shutdown will join.
    ///
    /// Refused once stop has begun, so nothing starts after the final join.
    pub fn spawn<F>(&self, worker: &'static str, future: F) -> ClientResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut workers = self.workers.lock();
        if self.is_stopped() {
            return Err(ClientError::Stopped);
        }
        workers.retain(|handle| !handle.is_finished());

        let span = tracing::debug_span!("worker", service = self.name, worker);
        workers.push(tokio::spawn(future.instrument(span)));
        Ok(())
    }

    /// Workers that have not exited yet.
    pub fn live_workers(&self) -> usize {
        self.workers
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Runs the stop sequence once.
    ///
    /// The first caller broadcasts stop, runs `on_stop`, and joins every
    /// worker. Later or concurrent callers skip straight to waiting for the
    /// first caller to finish. Returns true for the caller that did the work.
    pub async fn shutdown<F: FnOnce() + Send>(&self, on_stop: F) -> bool {
        let won = {
            // flag and spawn share the worker lock
            let _workers = self.workers.lock();
            self.stopped
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        };

        if !won {
            debug!(service = self.name, "Stop already in progress, waiting");
            let mut finished = self.finished.subscribe();
            while !*finished.borrow_and_update() {
                if finished.changed().await.is_err() {
                    break;
                }
            }
            return false;
        }

        info!(service = self.name, "Stopping service");
        self.signal.send_replace(true);
        on_stop();

        let joined = self.join_workers().await;
        self.finished.send_replace(true);
        info!(service = self.name, workers = joined, "Service stopped");
        true
    }

    async fn join_workers(&self) -> usize {
        let mut joined = 0;
        loop {
            let batch: Vec<_> = std::mem::take(&mut *self.workers.lock());
            if batch.is_empty() {
                return joined;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    error!(service = self.name, error = %e, "Worker ended abnormally");
                }
                joined += 1;
            }
        }
    }
}
