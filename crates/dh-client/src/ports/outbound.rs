//! Outbound ports - the transports the engine drives.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::domain::error::ClientResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        })
    }
}

/// A fully built HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(&'static str, String)>,
    /// JSON body [optional]
    pub body: Option<Vec<u8>>,
    /// Transport-level bound, independent of the caller's timeout
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Stateless request/response transport.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn perform(&self, request: HttpRequest) -> ClientResult<HttpResponse>;
}

/// Write half of a persistent connection. Only the send worker holds it.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: String) -> ClientResult<()>;

    async fn close(&mut self) -> ClientResult<()>;
}

/// Read half of a persistent connection. Only the receive worker holds it.
#[async_trait]
pub trait FrameReader: Send {
    /// Next text frame; `None` once the peer closed the connection.
    async fn read_frame(&mut self) -> ClientResult<Option<String>>;
}
