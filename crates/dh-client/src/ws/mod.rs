//! WebSocket transport.
//!
//! One connection, one send worker, one receive worker. Requests are
//! matched to responses by `requestId`; server pushes go to listeners.

pub mod envelope;
mod multiplexer;
pub mod service;

pub use envelope::{Envelope, PushEvent};
pub use service::WsService;
