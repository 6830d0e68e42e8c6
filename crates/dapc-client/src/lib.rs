//! dapc-client: Debug Adapter Protocol client.
//!
//! This crate implements the client side of the Debug Adapter Protocol:
//! protocol types, Content-Length framing, a sans-IO client state machine,
//! breakpoint and execution tracking, and an async session that drives the
//! client over an adapter's stdio or a TCP connection.

pub mod breakpoint;
pub mod capabilities;
pub mod client;
pub mod codec;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;

// Re-export key types for convenience.
pub use breakpoint::{BreakpointManager, ClientBreakpoint};
pub use capabilities::DapCapabilities;
pub use client::{ClientEvent, ClientState, DapClient, ErrorResponseEvent, ResponseEvent};
pub use codec::{encode_message, FrameDecoder};
pub use connection::{AdapterCommand, DebugSession, PendingRequest, SessionOptions};
pub use dispatcher::{Dispatcher, ResponseOutcome};
pub use error::DapError;
pub use events::{DebugEvent, StopReason};
pub use protocol::*;
pub use session::{DebuggeeState, ExecutionTracker};
