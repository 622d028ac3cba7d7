//! REST transport.
//!
//! Every call is an independent HTTP exchange run by its own worker;
//! subscriptions are emulated by long-poll workers.

pub(crate) mod executor;
pub mod poller;
pub mod request;
pub mod service;

pub use poller::{PollClass, PollQuery};
pub use request::{Expect, RestRequest};
pub use service::RestService;
