//! Domain types for the client.
//!
//! Configuration, errors, and the transport-independent engine pieces:
//! correlation of requests with responses, push listeners, and cursors.

pub mod config;
pub mod correlation;
pub mod cursor;
pub mod error;
pub mod listener;
pub mod task;

// Re-exports for convenience
pub use config::{ClientConfig, ConfigError, Endpoint, ListenerConfig, TimeoutConfig, WebSocketConfig};
pub use correlation::{CorrelationId, CorrelationRegistry};
pub use cursor::Cursor;
pub use error::{ClientError, ClientResult, RemoteError};
pub use listener::{Listener, ListenerClosed, ListenerRegistry};
pub use task::{Completion, Resolver, Task};
