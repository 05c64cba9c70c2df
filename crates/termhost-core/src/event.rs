//! Broadcast-based event emitters and the service-wide event type.

use tokio::sync::broadcast;

use crate::connection::ConnectionState;
use crate::instance::{InstanceId, TerminalLocation};

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast-based emitter.
///
/// Non-blocking: `emit` never awaits. Slow receivers lag rather than block
/// the sender. Clones share the same channel.
#[derive(Debug)]
pub struct Emitter<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Emitter<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit to all current subscribers. Returns how many received it.
    pub fn emit(&self, event: T) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Events emitted by [`TerminalService`](crate::service::TerminalService).
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    InstanceCreated(InstanceId),
    InstanceDisposed(InstanceId),
    /// The service-wide active instance, after cross-host fallback.
    ActiveInstanceChanged(Option<InstanceId>),
    InstancesChanged,
    ActiveGroupChanged,
    InstanceMoved {
        instance: InstanceId,
        target: TerminalLocation,
    },
    /// An instance was handed to another window.
    InstanceDetached(InstanceId),
    EditableChanged(Option<InstanceId>),
    ProcessSupportRegistered,
    ConnectionStateChanged(ConnectionState),
}
