//! WebSocket multiplexer - one connection, many concurrent requests.
//!
//! ```text
//!  callers ──► send queue ──► [send worker] ──► FrameWriter ──► server
//!     ▲                                                          │
//!     │  Completion              CorrelationRegistry             │
//!     └──────────── resolve ◄── [receive worker] ◄── FrameReader ◄┘
//!                                   │
//!                                   └── push ──► ListenerRegistry ──► Listener
//! ```
//!
//! A frame whose `requestId` matches a pending task resolves that task.
//! Anything else is a server push and is routed by action and device id.
//!
//! When the server side goes away the receive worker records the reason and
//! the send worker follows it out, failing whatever is still queued.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use shared_types::{Command, Notification};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

use crate::domain::correlation::{CorrelationId, CorrelationRegistry};
use crate::domain::error::ClientError;
use crate::domain::listener::ListenerRegistry;
use crate::lifecycle::StopSignal;
use crate::ports::outbound::{FrameReader, FrameWriter};
use crate::ws::envelope::{Envelope, PushEvent};

/// A request waiting for the send worker.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub id: CorrelationId,
    pub envelope: Envelope,
}

/// State shared by the caller side and both workers.
pub(crate) struct Multiplexer {
    registry: CorrelationRegistry<Envelope>,
    commands: ListenerRegistry<Command>,
    notifications: ListenerRegistry<Notification>,
    /// Why the connection ended, once it has
    lost: watch::Sender<Option<String>>,
}

impl Multiplexer {
    pub fn new(listener_capacity: usize) -> Self {
        Self {
            registry: CorrelationRegistry::new(),
            commands: ListenerRegistry::new("command", listener_capacity),
            notifications: ListenerRegistry::new("notification", listener_capacity),
            lost: watch::Sender::new(None),
        }
    }

    pub fn registry(&self) -> &CorrelationRegistry<Envelope> {
        &self.registry
    }

    pub fn commands(&self) -> &ListenerRegistry<Command> {
        &self.commands
    }

    pub fn notifications(&self) -> &ListenerRegistry<Notification> {
        &self.notifications
    }

    /// The reason the connection ended, `None` while it is up.
    pub fn lost(&self) -> Option<String> {
        self.lost.borrow().clone()
    }

    /// Fails every pending task with a connection error.
    fn fail_pending(&self, reason: &str) -> usize {
        let pending = self.registry.drain();
        let count = pending.len();
        for resolver in pending {
            resolver.resolve(Err(ClientError::Connection(reason.to_string())));
        }
        count
    }

    /// Closes every listener and fails every pending task with `Stopped`.
    pub fn close_all(&self) {
        let commands = self.commands.remove_all();
        let notifications = self.notifications.remove_all();
        let pending = self.registry.drain();
        debug!(
            commands,
            notifications,
            pending = pending.len(),
            "Closing multiplexer"
        );
        for resolver in pending {
            resolver.resolve(Err(ClientError::Stopped));
        }
    }

    /// Send worker: sole owner of the writer.
    ///
    /// A frame that cannot be written fails its own task only; the worker
    /// keeps going until stop, connection loss, or every sender being gone.
    pub async fn run_sender<W: FrameWriter>(
        self: Arc<Self>,
        mut writer: W,
        mut queue: mpsc::Receiver<Outbound>,
        mut stop: StopSignal,
    ) {
        let mut lost = self.lost.subscribe();
        loop {
            let outbound = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = lost.wait_for(Option::is_some) => {
                    self.abandon(&mut queue);
                    break;
                }
                next = queue.recv() => match next {
                    Some(outbound) => outbound,
                    None => break,
                },
            };
            self.transmit(&mut writer, outbound).await;
        }

        if let Err(e) = writer.close().await {
            debug!(error = %e, "Closing connection failed");
        }
        debug!("Send worker exited");
    }

    /// Refuses further frames and fails the queued ones, then anything that
    /// went out after the receive worker gave up.
    fn abandon(&self, queue: &mut mpsc::Receiver<Outbound>) {
        let reason = self.lost().unwrap_or_default();
        queue.close();
        let mut dropped = 0;
        while let Ok(Outbound { id, .. }) = queue.try_recv() {
            if let Some(resolver) = self.registry.take(id) {
                resolver.resolve(Err(ClientError::Connection(reason.clone())));
            }
            dropped += 1;
        }
        let pending = self.fail_pending(&reason);
        debug!(dropped, pending, "Send worker abandoning queue");
    }

    async fn transmit<W: FrameWriter>(&self, writer: &mut W, outbound: Outbound) {
        let Outbound { id, mut envelope } = outbound;
        envelope.request_id = Some(id.get());

        let written = match envelope.encode() {
            Ok(frame) => {
                trace!(correlation_id = %id, action = %envelope.action, "Writing frame");
                writer.write_frame(frame).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = written {
            warn!(correlation_id = %id, action = %envelope.action, error = %e, "Failed to send request");
            if let Some(resolver) = self.registry.take(id) {
                let reason = match e {
                    ClientError::TransmitFailed(reason) => reason,
                    other => other.to_string(),
                };
                resolver.resolve(Err(ClientError::TransmitFailed(reason)));
            }
        }
    }

    /// Receive worker: sole owner of the reader.
    ///
    /// When the connection ends on its own, every pending task fails with a
    /// connection error instead of waiting out its timeout.
    pub async fn run_receiver<R: FrameReader>(self: Arc<Self>, mut reader: R, mut stop: StopSignal) {
        let reason = loop {
            let frame = tokio::select! {
                biased;
                _ = stop.stopped() => {
                    debug!("Receive worker exited");
                    return;
                }
                frame = reader.read_frame() => frame,
            };

            match frame {
                Ok(Some(frame)) => self.dispatch(&frame).await,
                Ok(None) => break "connection closed by server".to_string(),
                Err(e) => break e.to_string(),
            }
        };

        let pending = self.fail_pending(&reason);
        self.lost.send_replace(Some(reason.clone()));
        info!(reason = %reason, pending, "WebSocket connection lost");
    }

    /// Handles one inbound frame.
    pub async fn dispatch(&self, frame: &str) {
        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed frame");
                return;
            }
        };

        if let Some(id) = envelope.request_id.and_then(CorrelationId::from_raw) {
            match self.registry.take(id) {
                Some(resolver) => {
                    resolver.resolve(envelope.into_result());
                }
                None => debug!(correlation_id = %id, action = %envelope.action, "Dropping late response"),
            }
            return;
        }

        match PushEvent::from_action(&envelope.action) {
            PushEvent::CommandInsert | PushEvent::CommandUpdate => {
                route(&self.commands, envelope, "Command", "command").await
            }
            PushEvent::NotificationInsert => {
                route(&self.notifications, envelope, "Notification", "notification").await
            }
            PushEvent::Unknown => {
                warn!(action = %envelope.action, "Dropping frame with unknown action")
            }
        }
    }
}

async fn route<T: DeserializeOwned>(
    listeners: &ListenerRegistry<T>,
    mut envelope: Envelope,
    kind: &'static str,
    field: &str,
) {
    let Some(device_id) = envelope.device_guid.take() else {
        warn!(action = %envelope.action, "Dropping push without deviceGuid");
        return;
    };
    let record: T = match envelope.take_record(kind, field) {
        Ok(record) => record,
        Err(e) => {
            warn!(action = %envelope.action, device_id = %device_id, error = %e, "Dropping malformed push");
            return;
        }
    };
    let Some(listener) = listeners.find(&device_id) else {
        warn!(
            class = listeners.class(),
            device_id = %device_id,
            "No listener for push, dropping"
        );
        return;
    };
    if listener.deliver(record).await.is_err() {
        debug!(class = listeners.class(), device_id = %device_id, "Listener closed during delivery");
    }
}
