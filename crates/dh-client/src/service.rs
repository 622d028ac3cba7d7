//! Transport selection.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::domain::config::ClientConfig;
use crate::domain::error::ClientResult;
use crate::ports::inbound::DeviceApi;
use crate::rest::RestService;
use crate::ws::WsService;

/// Which transport a service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// WebSocket for `ws://` and `wss://` URLs, REST for anything else
    #[default]
    Auto,
    WebSocket,
    Rest,
}

impl Transport {
    /// Resolves `Auto` against `url`.
    pub fn resolve(self, url: &str) -> Self {
        match self {
            Self::Auto => {
                let url = url.trim_start().to_ascii_lowercase();
                if url.starts_with("ws://") || url.starts_with("wss://") {
                    Self::WebSocket
                } else {
                    Self::Rest
                }
            }
            other => other,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::WebSocket => "websocket",
            Self::Rest => "rest",
        })
    }
}

/// Opens a service for `config` over `transport`.
///
/// A WebSocket service is connected when this returns; a REST service
/// makes no request until the first call.
pub async fn connect(config: ClientConfig, transport: Transport) -> ClientResult<Arc<dyn DeviceApi>> {
    let transport = transport.resolve(config.base_url());
    debug!(%transport, base_url = %config.base_url(), "Opening service");
    Ok(match transport {
        Transport::WebSocket => Arc::new(WsService::connect(config).await?),
        Transport::Rest | Transport::Auto => Arc::new(RestService::new(config)?),
    })
}
