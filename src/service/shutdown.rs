// Copyright 2025 the portrelay authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Process-wide stop trigger. Single logical writer, any number of
/// subscribed readers. `stop` is idempotent; tokens handed out after the
/// signal fired observe it immediately.
#[derive(Debug, Clone)]
pub struct StopSignal {
    notify: broadcast::Sender<()>,
    stopped: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> StopSignal {
        let (notify, _) = broadcast::channel(1);
        StopSignal {
            notify,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // no receivers around is fine, the latch above covers late tokens
        let _ = self.notify.send(());
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Creates a cancellation token for one loop to poll.
    pub fn token(&self) -> Shutdown {
        // subscribe before reading the flag: a stop landing in between is
        // then visible either through the latch or as a pending message
        let notify = self.notify.subscribe();
        Shutdown {
            is_shutdown: self.is_stopped(),
            notify,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        StopSignal::new()
    }
}

/// Per-loop view of the stop signal. Latches after the first observation so
/// repeated `recv` calls return immediately.
#[derive(Debug)]
pub struct Shutdown {
    is_shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown
    }

    pub async fn recv(&mut self) {
        if self.is_shutdown {
            return;
        }
        let _ = self.notify.recv().await;
        self.is_shutdown = true;
    }
}
