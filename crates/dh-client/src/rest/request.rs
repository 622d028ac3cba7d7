//! REST request description and URL/header assembly.

use std::time::Duration;

use reqwest::Url;
use serde::Serialize;
use shared_types::Device;

use crate::domain::config::ClientConfig;
use crate::domain::error::{ClientError, ClientResult};
use crate::ports::outbound::{HttpMethod, HttpRequest};

pub const HEADER_AUTHORIZATION: &str = "Authorization";
pub const HEADER_DEVICE_ID: &str = "Auth-DeviceID";
pub const HEADER_DEVICE_KEY: &str = "Auth-DeviceKey";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

/// Which response statuses count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Exactly 200; reads.
    Ok,
    /// Any 2xx; writes. 204 carries no body.
    Success,
}

impl Expect {
    pub fn accepts(self, status: u16) -> bool {
        match self {
            Self::Ok => status == 200,
            Self::Success => (200..300).contains(&status),
        }
    }
}

/// One REST call, independent of the server it goes to.
#[derive(Debug, Clone)]
pub struct RestRequest {
    /// Short operation name for logs, e.g. `"command/insert"`
    pub label: &'static str,
    pub method: HttpMethod,
    pub segments: Vec<String>,
    pub query: Vec<(&'static str, String)>,
    pub body: Option<Vec<u8>>,
    /// Device credentials: (id, key)
    pub device: Option<(String, String)>,
    pub expect: Expect,
}

impl RestRequest {
    /// Reads expect 200, everything else any 2xx.
    pub fn new<S: AsRef<str>>(label: &'static str, method: HttpMethod, segments: &[S]) -> Self {
        Self {
            label,
            method,
            segments: segments.iter().map(|s| s.as_ref().to_string()).collect(),
            query: Vec::new(),
            body: None,
            device: None,
            expect: if method == HttpMethod::Get {
                Expect::Ok
            } else {
                Expect::Success
            },
        }
    }

    pub fn get<S: AsRef<str>>(label: &'static str, segments: &[S]) -> Self {
        Self::new(label, HttpMethod::Get, segments)
    }

    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    /// Serializes `body` as the JSON payload.
    pub fn json(mut self, body: &impl Serialize) -> ClientResult<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| ClientError::TransmitFailed(format!("failed to encode {}: {e}", self.label)))?;
        self.body = Some(bytes);
        Ok(self)
    }

    /// Adds per-request device credentials when the device has them.
    pub fn device(mut self, device: &Device) -> Self {
        self.device = Some((device.id.clone(), device.key.clone()));
        self
    }

    pub fn expect(mut self, expect: Expect) -> Self {
        self.expect = expect;
        self
    }

    /// Resolves against `config.base_url` and attaches the auth headers.
    pub fn build(&self, config: &ClientConfig, timeout: Option<Duration>) -> ClientResult<HttpRequest> {
        let base = config.base_url();
        let mut url = Url::parse(base).map_err(|e| ClientError::InvalidUrl(format!("{base}: {e}")))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(format!("{base}: cannot be a base")))?;
            path.pop_if_empty().extend(&self.segments);
        }
        if !self.query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(self.query.iter().map(|(k, v)| (*k, v.as_str())));
        }

        let mut headers = Vec::new();
        if let Some(key) = &config.access_key {
            headers.push((HEADER_AUTHORIZATION, format!("Bearer {key}")));
        }
        if let Some((id, key)) = &self.device {
            if !id.is_empty() {
                headers.push((HEADER_DEVICE_ID, id.clone()));
            }
            if !key.is_empty() {
                headers.push((HEADER_DEVICE_KEY, key.clone()));
            }
        }
        if self.body.is_some() {
            headers.push((HEADER_CONTENT_TYPE, "application/json".to_string()));
        }

        Ok(HttpRequest {
            method: self.method,
            url,
            headers,
            body: self.body.clone(),
            timeout,
        })
    }
}
