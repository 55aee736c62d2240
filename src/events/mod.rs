//! Change-notification system for server-sent event streams
//!
//! This module provides:
//! - `ChangeEvent`: typed events emitted after every committed mutation
//! - `Broadcaster`: the set of connected stream subscribers and the fan-out to them
//! - `Subscription`: a channel-backed subscriber that unsubscribes when dropped

mod broadcaster;
mod types;

pub use broadcaster::{
    Broadcaster, ChannelSink, DeliveryError, EventSink, SubscriberId, Subscription,
};
pub use types::{ChangeEvent, EntityRef, EventEmitter, MembershipRef, SseFrame};
