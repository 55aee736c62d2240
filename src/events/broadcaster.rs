//! Fan-out of change events to every connected streaming client

use super::{ChangeEvent, EventEmitter, SseFrame};
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Failure writing a frame to one subscriber
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("subscriber channel closed")]
    Closed,
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// An output channel able to take incremental writes without closing
pub trait EventSink: Send {
    fn deliver(&mut self, frame: &SseFrame) -> Result<(), DeliveryError>;
}

/// Sink backed by an unbounded channel; the receiving half feeds an HTTP stream
pub struct ChannelSink(mpsc::UnboundedSender<SseFrame>);

impl EventSink for ChannelSink {
    fn deliver(&mut self, frame: &SseFrame) -> Result<(), DeliveryError> {
        self.0.send(frame.clone()).map_err(|_| DeliveryError::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    sinks: Vec<(SubscriberId, Box<dyn EventSink>)>,
}

/// Broadcaster owning the set of active subscribers.
///
/// Clones share the same subscriber set. Notifications are best-effort:
/// a failing subscriber is logged and pruned, the others still receive the
/// frame, and nothing is reported to the caller.
#[derive(Clone, Default)]
pub struct Broadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // A panic inside a sink must not disable notifications for everyone else
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an output channel. Always succeeds.
    pub fn subscribe(&self, sink: Box<dyn EventSink>) -> SubscriberId {
        let mut registry = self.registry();
        registry.next_id += 1;
        let id = SubscriberId(registry.next_id);
        registry.sinks.push((id, sink));
        debug!(subscriber = %id, total = registry.sinks.len(), "Subscriber registered");
        id
    }

    /// Register a channel-backed subscriber whose lifetime ends when the
    /// returned [`Subscription`] is dropped.
    pub fn subscribe_channel(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(Box::new(ChannelSink(tx)));
        Subscription {
            id,
            receiver: rx,
            broadcaster: self.clone(),
        }
    }

    /// Remove a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = {
            let mut registry = self.registry();
            registry
                .sinks
                .iter()
                .position(|(sid, _)| *sid == id)
                .map(|pos| registry.sinks.remove(pos))
        };
        match removed {
            Some(_sink) => {
                debug!(subscriber = %id, total = self.subscriber_count(), "Subscriber removed");
                true
            }
            None => false,
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.registry().sinks.len()
    }

    /// Write the event to every active subscriber.
    ///
    /// Returns how many subscribers accepted the frame.
    pub fn notify(&self, event: &ChangeEvent) -> usize {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event = event.name(), "Failed to serialize change event: {}", e);
                return 0;
            }
        };

        // Sends are non-blocking, so holding the lock across the loop keeps
        // every subscriber on the same global order.
        let (delivered, dead) = {
            let mut registry = self.registry();
            if registry.sinks.is_empty() {
                return 0;
            }

            let mut delivered = 0;
            let mut failed = Vec::new();
            for (id, sink) in registry.sinks.iter_mut() {
                match sink.deliver(&frame) {
                    Ok(()) => delivered += 1,
                    Err(e) => {
                        warn!(subscriber = %id, event = frame.event, "Dropping subscriber: {}", e);
                        failed.push(*id);
                    }
                }
            }

            let mut dead = Vec::with_capacity(failed.len());
            if !failed.is_empty() {
                let mut kept = Vec::with_capacity(registry.sinks.len());
                for entry in registry.sinks.drain(..) {
                    if failed.contains(&entry.0) {
                        dead.push(entry);
                    } else {
                        kept.push(entry);
                    }
                }
                registry.sinks = kept;
            }
            (delivered, dead)
        };
        drop(dead);

        debug!(event = frame.event, subscribers = delivered, "Change event broadcast");
        delivered
    }

    /// Drop every subscriber so open streams terminate. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let sinks = std::mem::take(&mut self.registry().sinks);
        let closed = sinks.len();
        drop(sinks);
        if closed > 0 {
            debug!(closed, "Closed all subscribers");
        }
        closed
    }
}

impl EventEmitter for Broadcaster {
    fn emit(&self, event: ChangeEvent) {
        self.notify(&event);
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Receiving half of a channel-backed subscriber.
///
/// Yields frames in emission order; ends when the broadcaster closes it.
/// Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::UnboundedReceiver<SseFrame>,
    broadcaster: Broadcaster,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next frame; `None` once the subscriber was closed
    pub async fn recv(&mut self) -> Option<SseFrame> {
        self.receiver.recv().await
    }

    /// Take an already queued frame without waiting
    pub fn try_recv(&mut self) -> Option<SseFrame> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = SseFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}
