//! Adapters - concrete transports behind the outbound ports.

pub mod channel;
pub mod http;
pub mod websocket;

pub use http::ReqwestTransport;
pub use websocket::{WsFrameReader, WsFrameWriter};
