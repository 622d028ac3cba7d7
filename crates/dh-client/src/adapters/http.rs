//! reqwest-backed [`HttpTransport`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use crate::domain::error::{ClientError, ClientResult};
use crate::ports::outbound::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

/// Upper bound on establishing a TCP/TLS connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP transport over a shared reqwest connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Connection(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn perform(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        trace!(method = %request.method, url = %request.url, "Sending HTTP request");

        let mut builder = self.client.request(method(request.method), request.url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Connection(format!("failed to read body: {e}")))?;

        trace!(status, bytes = body.len(), "Got HTTP response");
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}
