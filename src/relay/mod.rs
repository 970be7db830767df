//! The example composition built on the generic server: two singleton
//! handlers, one per transport, forwarding raw bytes between each other
//! through a shared registry.

pub use handler::{RelayHandler, RelayHandlerFactory};
pub use registry::{PeerRegistry, RegisteredWriter, RelaySide};

mod handler;
mod registry;
