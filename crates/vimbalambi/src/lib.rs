//! Top-level facade crate for Vimbalambi's realtime stack.
//!
//! Re-exports the wire protocol, the relay server library, and the client
//! connection manager so users can depend on a single crate.

pub mod proto {
    pub use vimbalambi_proto::*;
}

pub mod relay {
    pub use vimbalambi_relay::*;
}

pub mod client {
    pub use vimbalambi_client::*;
}
