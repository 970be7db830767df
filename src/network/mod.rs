//! Transport layer of the relay.
//!
//! Everything here is transport-kind agnostic from the caller's point of
//! view: listeners and streams are enumerated over the supported families
//! (TCP, Bluetooth RFCOMM) and the timed socket applies the same bounded
//! read/write contract to all of them.
//!
//! # Components
//!
//! - `TransportListener` / `TransportStream`: the enumerated endpoints
//! - `TimedSocket`: bounded-time receive/send over one connected stream
//! - `SocketClient`: the dialing counterpart, used by tests and tooling

pub use client::SocketClient;
pub use timed_socket::{SocketReader, SocketWriter, TimedSocket};
pub use transport::{BindAddress, PeerAddr, TransportKind, TransportListener, TransportStream};

mod client;
mod timed_socket;
mod transport;
