//! Process-wide fan-out channel for results that arrive outside any
//! controller's call stack.

use tokio::sync::broadcast;
use tracing::warn;

pub const DEFAULT_BUS_CAPACITY: usize = 16;

/// Unbuffered broadcast bus. Events published while nobody listens are
/// dropped; each live subscriber gets its own copy of every later event.
pub struct EventBus<T> {
    name: &'static str,
    tx: broadcast::Sender<T>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { name, tx }
    }

    /// Never blocks and never fails. Returns how many subscribers were
    /// reached.
    pub fn publish(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> BusSubscription<T> {
        BusSubscription {
            bus: self.name,
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct BusSubscription<T> {
    bus: &'static str,
    rx: broadcast::Receiver<T>,
}

impl<T: Clone + Send + 'static> BusSubscription<T> {
    /// Next event in publish order; `None` once the bus itself is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(bus = self.bus, skipped, "bus subscriber lagged; events lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(bus = self.bus, skipped, "bus subscriber lagged; events lost");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/event_bus_tests.rs"]
mod tests;
