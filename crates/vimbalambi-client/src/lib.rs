//! Vimbalambi client: one reconnecting relay connection with typed pub/sub.
//!
//! The [`manager::ConnectionManager`] is an explicitly constructed, owned
//! instance; whatever owns it controls `connect`/`disconnect`. The rest of
//! an application talks to the relay exclusively through the manager's
//! subscriber API and convenience senders.

pub mod config;
pub mod events;
pub mod manager;
pub mod subscribers;

pub use config::{relay_url, ClientConfig, ReconnectPolicy};
pub use events::{ClientEvent, EventKind};
pub use manager::{ConnectionManager, UserIdentity};
pub use subscribers::Subscription;
