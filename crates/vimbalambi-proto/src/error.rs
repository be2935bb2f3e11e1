//! Shared error type across Vimbalambi crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Unified error type used by the proto, relay, and client crates.
///
/// Operational noise (malformed frames, unreachable peers, sends while
/// disconnected) is absorbed at the call site and logged, never surfaced
/// through this type; these variants cover genuine failures such as bad
/// configuration or a broken transport.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed envelope: {0}")]
    Malformed(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("websocket error: {0}")]
    WebSocket(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal: {0}")]
    Internal(String),
}
