//! DAP error types.

use thiserror::Error;

/// Errors from DAP client operations.
#[derive(Debug, Error)]
pub enum DapError {
    /// Adapter process failed to start or could not be reached.
    #[error("adapter failed to start: {0}")]
    AdapterSpawnFailed(#[from] std::io::Error),

    /// Transport-level communication error.
    #[error("transport error: {0}")]
    Transport(String),

    /// A frame header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Adapter sent an invalid or unparseable message.
    #[error("adapter sent invalid response: {0}")]
    InvalidResponse(String),

    /// A message could not be serialized or a body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The operation is not allowed in the current client state.
    #[error("cannot {operation} while client is {state}")]
    InvalidState {
        /// The attempted operation (usually the DAP command).
        operation: String,
        /// The client state at the time of the call.
        state: String,
    },

    /// Request timed out waiting for a response.
    #[error("request timed out: {command}")]
    Timeout {
        /// The command that timed out.
        command: String,
    },

    /// Adapter answered the request with `success: false`.
    #[error("adapter rejected {command}: {message}")]
    Rejected {
        /// The rejected command.
        command: String,
        /// The rejection message from the adapter.
        message: String,
    },

    /// The connection to the adapter closed before a response arrived.
    #[error("connection to adapter closed")]
    ConnectionClosed,

    /// Session has not been initialized yet.
    #[error("session not initialized")]
    NotInitialized,

    /// Session has already been terminated.
    #[error("session already terminated")]
    Terminated,
}
