//! Service-wide aggregate streams over per-instance events.
//!
//! Each selector gets one aggregate channel, built on first request and kept
//! in a table. Every live instance has one forwarding task per selector;
//! untracking an instance aborts its tasks. A dying instance is retired
//! instead: its last events go straight to the streams, then its tasks are
//! aborted.

use std::collections::HashMap;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::Emitter;
use crate::instance::{Capability, InstanceEvent, InstanceEventKind, InstanceId, TerminalInstance};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    Event(InstanceEventKind),
    /// `CapabilityAdded` for one capability only.
    Capability(Capability),
}

impl Selector {
    fn matches(&self, event: &InstanceEvent) -> bool {
        match self {
            Selector::Event(kind) => event.kind() == *kind,
            Selector::Capability(capability) => matches!(
                event,
                InstanceEvent::CapabilityAdded { capability: added, .. } if added == capability
            ),
        }
    }
}

#[derive(Debug)]
struct AggregateStream {
    output: Emitter<InstanceEvent>,
    forwarders: HashMap<InstanceId, JoinHandle<()>>,
}

impl AggregateStream {
    fn forward(&mut self, selector: Selector, id: InstanceId, source: &Emitter<InstanceEvent>) {
        let mut rx = source.subscribe();
        let output = self.output.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if selector.matches(&event) {
                            output.emit(event);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            event = "core.multiplexer.forward_lagged",
                            instance_id = %id,
                            skipped = skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        if let Some(old) = self.forwarders.insert(id, handle) {
            old.abort();
        }
    }
}

#[derive(Debug, Default)]
pub struct EventMultiplexer {
    live: HashMap<InstanceId, Emitter<InstanceEvent>>,
    streams: HashMap<Selector, AggregateStream>,
}

impl EventMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start forwarding the instance's events into every existing stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn track(&mut self, instance: &TerminalInstance) {
        let id = instance.id();
        let source = instance.emitter();
        for (selector, stream) in &mut self.streams {
            stream.forward(*selector, id, &source);
        }
        self.live.insert(id, source);
        debug!(event = "core.multiplexer.tracked", instance_id = %id, live = self.live.len());
    }

    /// Abort the instance's forwarders in every stream.
    ///
    /// Returns false if the instance was not tracked.
    pub fn untrack(&mut self, id: InstanceId) -> bool {
        if self.live.remove(&id).is_none() {
            return false;
        }
        for stream in self.streams.values_mut() {
            if let Some(handle) = stream.forwarders.remove(&id) {
                handle.abort();
            }
        }
        debug!(event = "core.multiplexer.untracked", instance_id = %id, live = self.live.len());
        true
    }

    /// Untrack the instance and deliver `last` to every matching stream.
    ///
    /// Nothing is delivered for an instance that is no longer tracked, so a
    /// second retire is a no-op.
    pub fn retire(&mut self, id: InstanceId, last: &[InstanceEvent]) {
        if !self.untrack(id) {
            return;
        }
        for (selector, stream) in &self.streams {
            for event in last.iter().filter(|e| selector.matches(e)) {
                stream.output.emit(event.clone());
            }
        }
    }

    fn stream(&mut self, selector: Selector) -> broadcast::Receiver<InstanceEvent> {
        if let Some(stream) = self.streams.get(&selector) {
            return stream.output.subscribe();
        }

        let mut stream = AggregateStream {
            output: Emitter::new(),
            forwarders: HashMap::new(),
        };
        for (id, source) in &self.live {
            stream.forward(selector, *id, source);
        }
        let rx = stream.output.subscribe();
        self.streams.insert(selector, stream);
        debug!(event = "core.multiplexer.stream_created", selector = ?selector);
        rx
    }

    /// Aggregate stream of one event kind across all live instances.
    pub fn on_any_instance(&mut self, kind: InstanceEventKind) -> broadcast::Receiver<InstanceEvent> {
        self.stream(Selector::Event(kind))
    }

    /// Fires when `capability` is added to any live or future instance.
    pub fn on_instance_capability(
        &mut self,
        capability: Capability,
    ) -> broadcast::Receiver<InstanceEvent> {
        self.stream(Selector::Capability(capability))
    }

    /// Number of forwarders backing a stream. Zero if it was never requested.
    pub fn subscription_count(&self, selector: Selector) -> usize {
        self.streams
            .get(&selector)
            .map(|s| s.forwarders.len())
            .unwrap_or(0)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}

impl Drop for EventMultiplexer {
    fn drop(&mut self) {
        for stream in self.streams.values() {
            for handle in stream.forwarders.values() {
                handle.abort();
            }
        }
    }
}
