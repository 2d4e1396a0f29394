//! Live update channel: wire protocol, client registry, browser runtime.

pub mod channel;
pub mod client;
pub mod protocol;

pub use channel::{BroadcastError, ClientId, LiveChannel};
pub use client::client_runtime;
pub use protocol::HmrMessage;

/// WebSocket path on the live update port.
pub const HMR_PATH: &str = "/__hmr";
