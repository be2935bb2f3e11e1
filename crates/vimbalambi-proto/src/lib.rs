//! Vimbalambi proto: wire-level envelope types and the shared error surface.
//!
//! This crate defines the envelope contract exchanged between the relay
//! server and client connection managers. It intentionally carries no
//! transport or runtime dependencies so both sides (and test tooling) can
//! share it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `RelayError`/`Result` so a malformed
//! frame can never take a connection down.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod envelope;
pub mod error;

pub use envelope::{
    CallRequestData, CallResponseData, CallType, Envelope, EventPayload, MessageData,
    PresenceData, TypingData,
};
pub use error::{RelayError, Result};
