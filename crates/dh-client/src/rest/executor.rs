//! Request executor - one worker per REST call, raced against timeout and stop.
//!
//! The HTTP exchange runs in its own worker so that a caller giving up does
//! not abort it half way. Whichever side takes the registry entry first
//! decides the outcome; a response arriving after that is dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::domain::config::ClientConfig;
use crate::domain::correlation::CorrelationRegistry;
use crate::domain::error::{ClientError, ClientResult, RemoteError};
use crate::lifecycle::Lifecycle;
use crate::ports::outbound::{HttpResponse, HttpTransport};
use crate::rest::request::RestRequest;

/// Longest server error text carried into [`RemoteError::message`].
const MAX_ERROR_TEXT: usize = 256;

pub(crate) struct Executor {
    config: ClientConfig,
    transport: Arc<dyn HttpTransport>,
    lifecycle: Arc<Lifecycle>,
    registry: Arc<CorrelationRegistry<HttpResponse>>,
}

impl Executor {
    pub fn new(config: ClientConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            lifecycle: Arc::new(Lifecycle::new("rest")),
            registry: Arc::new(CorrelationRegistry::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    pub fn registry(&self) -> &CorrelationRegistry<HttpResponse> {
        &self.registry
    }

    /// Performs `request` and decodes the JSON body.
    pub async fn fetch<T: DeserializeOwned>(
        &self,
        request: RestRequest,
        timeout: Option<Duration>,
    ) -> ClientResult<T> {
        let label = request.label;
        let response = self.execute(request, timeout).await?;
        serde_json::from_slice(&response.body).map_err(|e| {
            warn!(label, error = %e, "Failed to parse response body");
            ClientError::MalformedResponse(format!("{label}: {e}"))
        })
    }

    /// Performs `request` and ignores the body.
    pub async fn send(&self, request: RestRequest, timeout: Option<Duration>) -> ClientResult<()> {
        self.execute(request, timeout).await.map(drop)
    }

    /// Performs `request`, failing on an unexpected status.
    pub async fn execute(&self, request: RestRequest, timeout: Option<Duration>) -> ClientResult<HttpResponse> {
        self.lifecycle.ensure_running()?;
        let timeout = timeout.unwrap_or(self.config.timeouts.default);
        let label = request.label;
        let http = request.build(&self.config, Some(timeout))?;

        let (id, http, completion) = self.registry.create(label, http, timeout).into_parts();
        trace!(correlation_id = %id, label, method = %http.method, url = %http.url, "Dispatching");

        let worker = {
            let transport = self.transport.clone();
            let registry = self.registry.clone();
            let mut stop = self.lifecycle.signal();
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = stop.stopped() => Err(ClientError::Stopped),
                    outcome = transport.perform(http) => outcome,
                };
                match registry.take(id) {
                    Some(resolver) => {
                        resolver.resolve(outcome);
                    }
                    None => debug!(correlation_id = %id, label, "Dropping late HTTP response"),
                }
            }
        };
        if let Err(e) = self.lifecycle.spawn("http", worker) {
            self.registry.discard(id);
            return Err(e);
        }

        let mut stop = self.lifecycle.signal();
        let outcome = tokio::select! {
            biased;
            _ = stop.stopped() => Err(ClientError::Stopped),
            outcome = completion => outcome,
            _ = tokio::time::sleep(timeout) => {
                warn!(correlation_id = %id, label, timeout_ms = timeout.as_millis() as u64, "Request timed out");
                Err(ClientError::Timeout(timeout))
            }
        };
        if outcome.is_err() {
            self.registry.discard(id);
        }

        let response = outcome?;
        if request.expect.accepts(response.status) {
            return Ok(response);
        }
        let remote = remote_error(&response);
        warn!(label, status = response.status, error = %remote, "Unexpected response status");
        Err(ClientError::Transport(remote))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Builds the error for a response with an unexpected status.
pub(crate) fn remote_error(response: &HttpResponse) -> RemoteError {
    if let Ok(body) = serde_json::from_slice::<ErrorBody>(&response.body) {
        if let Some(message) = body.message {
            return RemoteError {
                status: Some(response.status),
                code: body.error,
                message,
            };
        }
    }
    let text = String::from_utf8_lossy(&response.body);
    let text = text.trim();
    let message = match text.char_indices().nth(MAX_ERROR_TEXT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    };
    RemoteError::http(response.status, message)
}
