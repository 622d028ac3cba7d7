//! Cross-transport integration flows.

pub mod support;

mod rest_flows;
mod ws_flows;
