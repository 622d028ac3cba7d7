//! Task - one request awaiting one response.
//!
//! The registry hands out a [`Task`] whose [`Completion`] the caller awaits.
//! The matching [`Resolver`] stays in the registry until exactly one party
//! takes it out: the worker that got the answer, or the caller giving up.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::correlation::CorrelationId;
use crate::domain::error::{ClientError, ClientResult};

/// A registered request.
#[derive(Debug)]
pub struct Task<O, R> {
    id: CorrelationId,
    outbound: O,
    timeout: Duration,
    completion: Completion<R>,
}

impl<O, R> Task<O, R> {
    pub(crate) fn new(
        id: CorrelationId,
        outbound: O,
        timeout: Duration,
        rx: oneshot::Receiver<ClientResult<R>>,
    ) -> Self {
        Self {
            id,
            outbound,
            timeout,
            completion: Completion { id, rx },
        }
    }

    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn outbound(&self) -> &O {
        &self.outbound
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Splits the task so the payload can go to a worker while the caller
    /// keeps the completion.
    pub fn into_parts(self) -> (CorrelationId, O, Completion<R>) {
        (self.id, self.outbound, self.completion)
    }
}

/// Single-fire completion signal.
///
/// Resolves to [`ClientError::Stopped`] if the resolver is dropped without
/// firing, which only happens when the registry is drained.
#[derive(Debug)]
pub struct Completion<R> {
    id: CorrelationId,
    rx: oneshot::Receiver<ClientResult<R>>,
}

impl<R> Completion<R> {
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl<R> Future for Completion<R> {
    type Output = ClientResult<R>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(ClientError::Stopped)))
    }
}

/// The resolving half of a task, owned by the registry until taken.
#[derive(Debug)]
pub struct Resolver<R> {
    id: CorrelationId,
    sender: oneshot::Sender<ClientResult<R>>,
    created_at: Instant,
    label: String,
}

impl<R> Resolver<R> {
    pub(crate) fn new(
        id: CorrelationId,
        sender: oneshot::Sender<ClientResult<R>>,
        label: String,
    ) -> Self {
        Self {
            id,
            sender,
            created_at: Instant::now(),
            label,
        }
    }

    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Delivers the outcome. Never blocks.
    ///
    /// Returns false when the caller already went away.
    pub fn resolve(self, outcome: ClientResult<R>) -> bool {
        let elapsed = self.created_at.elapsed();
        match self.sender.send(outcome) {
            Ok(()) => {
                debug!(
                    correlation_id = %self.id,
                    label = %self.label,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Resolved task"
                );
                true
            }
            Err(_) => {
                debug!(
                    correlation_id = %self.id,
                    label = %self.label,
                    "Task caller gone, outcome discarded"
                );
                false
            }
        }
    }
}
