//! Ports - the seams between the engine and the outside world.

pub mod inbound;
pub mod outbound;

pub use inbound::DeviceApi;
pub use outbound::{FrameReader, FrameWriter, HttpMethod, HttpRequest, HttpResponse, HttpTransport};
