//! In-memory transports for testing.
//!
//! [`connection`] gives a client-side writer/reader pair plus the
//! [`FramePeer`] that plays the server. [`ScriptedTransport`] answers HTTP
//! requests from a closure and records what it was asked.

use std::future::Future;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domain::error::{ClientError, ClientResult};
use crate::ports::outbound::{FrameReader, FrameWriter, HttpRequest, HttpResponse, HttpTransport};

pub struct ChannelFrameWriter {
    tx: mpsc::UnboundedSender<String>,
    closed: bool,
}

#[async_trait]
impl FrameWriter for ChannelFrameWriter {
    async fn write_frame(&mut self, frame: String) -> ClientResult<()> {
        if self.closed {
            return Err(ClientError::TransmitFailed("connection closed".into()));
        }
        self.tx
            .send(frame)
            .map_err(|_| ClientError::TransmitFailed("peer gone".into()))
    }

    async fn close(&mut self) -> ClientResult<()> {
        self.closed = true;
        Ok(())
    }
}

pub struct ChannelFrameReader {
    rx: mpsc::UnboundedReceiver<ClientResult<String>>,
}

#[async_trait]
impl FrameReader for ChannelFrameReader {
    async fn read_frame(&mut self) -> ClientResult<Option<String>> {
        self.rx.recv().await.transpose()
    }
}

/// The server end of an in-memory connection.
pub struct FramePeer {
    /// Frames the client wrote
    pub sent: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<ClientResult<String>>,
}

impl FramePeer {
    /// Next frame written by the client, decoded.
    pub async fn next_sent(&mut self) -> Option<Value> {
        let frame = self.sent.recv().await?;
        serde_json::from_str(&frame).ok()
    }

    pub fn push(&self, value: Value) {
        let _ = self.inbound.send(Ok(value.to_string()));
    }

    pub fn push_raw(&self, frame: impl Into<String>) {
        let _ = self.inbound.send(Ok(frame.into()));
    }

    /// Makes the client's next read fail.
    pub fn push_error(&self, message: impl Into<String>) {
        let _ = self.inbound.send(Err(ClientError::Connection(message.into())));
    }
}

/// Creates a connected in-memory frame pair
pub fn connection() -> (ChannelFrameWriter, ChannelFrameReader, FramePeer) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (
        ChannelFrameWriter {
            tx: out_tx,
            closed: false,
        },
        ChannelFrameReader { rx: in_rx },
        FramePeer {
            sent: out_rx,
            inbound: in_tx,
        },
    )
}

type Handler = Box<dyn Fn(HttpRequest) -> BoxFuture<'static, ClientResult<HttpResponse>> + Send + Sync>;

/// HTTP transport answering from a closure.
pub struct ScriptedTransport {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ClientResult<HttpResponse>> + Send + 'static,
    {
        Self {
            handler: Box::new(move |request| Box::pin(handler(request))),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request performed so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn perform(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        self.requests.lock().push(request.clone());
        (self.handler)(request).await
    }
}

/// A response carrying `body` as JSON.
pub fn json_response(status: u16, body: &Value) -> HttpResponse {
    HttpResponse {
        status,
        body: body.to_string().into_bytes(),
    }
}
