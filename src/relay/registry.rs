use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use crate::network::SocketWriter;

/// Which end of the bridge a relay handler serves. The sides are labels for
/// pairing, not transport kinds; tests run both sides over TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelaySide {
    Bluetooth,
    Tcp,
}

impl RelaySide {
    pub fn peer(self) -> RelaySide {
        match self {
            RelaySide::Bluetooth => RelaySide::Tcp,
            RelaySide::Tcp => RelaySide::Bluetooth,
        }
    }
}

impl fmt::Display for RelaySide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelaySide::Bluetooth => write!(f, "bluetooth"),
            RelaySide::Tcp => write!(f, "tcp"),
        }
    }
}

/// Shared pairing point for the two relay handlers.
///
/// Each handler registers the write half of its own socket under its side;
/// forwarding looks up the peer side's half. One registration per side
/// (singleton semantics): registering again replaces the previous entry.
/// Unregistration only removes the caller's own entry, so a replaced
/// handler exiting late cannot evict its successor.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    slots: Mutex<HashMap<RelaySide, Arc<AsyncMutex<SocketWriter>>>>,
}

pub type RegisteredWriter = Arc<AsyncMutex<SocketWriter>>;

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry {
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, side: RelaySide, writer: SocketWriter) -> RegisteredWriter {
        let entry = Arc::new(AsyncMutex::new(writer));
        let previous = self.slots.lock().insert(side, entry.clone());
        if previous.is_some() {
            warn!("replacing previously registered {} relay endpoint", side);
        }
        entry
    }

    pub fn unregister(&self, side: RelaySide, entry: &RegisteredWriter) {
        let mut slots = self.slots.lock();
        if slots
            .get(&side)
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            slots.remove(&side);
        }
    }

    pub fn peer(&self, side: RelaySide) -> Option<RegisteredWriter> {
        self.slots.lock().get(&side.peer()).cloned()
    }

    /// True once both sides have a registered endpoint; forwarding only
    /// functions from that point on.
    pub fn is_paired(&self) -> bool {
        let slots = self.slots.lock();
        slots.contains_key(&RelaySide::Bluetooth) && slots.contains_key(&RelaySide::Tcp)
    }
}
