//! # DeviceHive Client Test Suite
//!
//! End-to-end flows through the public client API against in-process mock
//! servers.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs     # Mock WebSocket and REST servers
//!     ├── ws_flows.rs    # Device sessions over WebSocket
//!     └── rest_flows.rs  # Device sessions over REST with polling
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p dh-tests
//!
//! # One transport
//! cargo test -p dh-tests integration::ws_flows::
//! cargo test -p dh-tests integration::rest_flows::
//! ```

#![allow(dead_code)]

pub mod integration;
