//! Server-sent event stream of record changes

use super::handlers::SharedState;
use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::{stream, StreamExt};
use std::convert::Infallible;
use tracing::debug;

/// `GET /api/patients/stream` (alias `/api/events/stream`)
///
/// Registers a subscriber for the lifetime of the response. A `: connected`
/// comment is sent first, then one `event:`/`data:` message per change, with
/// keep-alive comments in between. Closing the connection unsubscribes.
pub async fn event_stream(State(state): State<SharedState>) -> impl IntoResponse {
    let subscription = state.broadcaster.subscribe_channel();
    debug!(
        subscriber = %subscription.id(),
        subscribers = state.broadcaster.subscriber_count(),
        "Event stream opened"
    );

    let connected = stream::once(async { Ok::<_, Infallible>(Event::default().comment("connected")) });
    let changes = subscription.map(|frame| {
        Ok::<_, Infallible>(Event::default().event(frame.event).data(frame.data))
    });

    let sse = Sse::new(connected.chain(changes))
        .keep_alive(KeepAlive::new().interval(state.config.keep_alive()));

    ([(header::CACHE_CONTROL, "no-cache")], sse)
}
