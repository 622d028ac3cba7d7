//! DeviceHive client - device API over REST or WebSocket.
//!
//! Both transports share one engine: requests are registered under a
//! correlation id and raced against their timeout and the service-wide stop
//! signal; commands and notifications reach the application through
//! per-device listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          DeviceApi (ports)                           │
//! ├───────────────────────────────────┬──────────────────────────────────┤
//! │            WsService              │           RestService            │
//! │                                   │                                  │
//! │  send queue ─► [send worker]      │  [http worker] per request       │
//! │  [receive worker] ─► resolve/push │  [poll worker] per subscription  │
//! ├───────────────────────────────────┴──────────────────────────────────┤
//! │  CorrelationRegistry   ListenerRegistry x2   Cursor   Lifecycle      │
//! ├───────────────────────────────────┬──────────────────────────────────┤
//! │   FrameWriter / FrameReader       │         HttpTransport            │
//! │      (tokio-tungstenite)          │           (reqwest)              │
//! └───────────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - Every call ends with a value, `Timeout`, `Stopped`, or a transport
//!   error; nothing waits without bound.
//! - A response is delivered to at most one caller; late responses are
//!   dropped.
//! - Subscribing twice to one device returns the same listener.
//! - `stop()` is idempotent and returns only after every worker exited.
//!
//! # Usage
//!
//! ```ignore
//! use dh_client::{connect, ClientConfig, DeviceApi, Transport};
//!
//! let service = connect(ClientConfig::new("ws://localhost/api/websocket"), Transport::Auto).await?;
//! let info = service.server_info(None).await?;
//! let commands = service.subscribe_commands(&device, None, None).await?;
//! while let Some(command) = commands.recv().await { /* ... */ }
//! service.stop().await;
//! ```

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod adapters;
pub mod domain;
pub mod lifecycle;
pub mod ports;
pub mod rest;
pub mod service;
pub mod ws;

// Re-exports for public API
pub use domain::config::{ClientConfig, ConfigError, Endpoint};
pub use domain::error::{ClientError, ClientResult, RemoteError};
pub use domain::listener::{Listener, ListenerClosed};
pub use ports::inbound::DeviceApi;
pub use rest::{PollQuery, RestService};
pub use service::{connect, Transport};
pub use shared_types::{
    Command, Device, DeviceClass, Equipment, Network, Notification, ServerInfo,
};
pub use ws::WsService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
