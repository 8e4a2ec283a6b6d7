//! Server-sent event stream for the live dashboard
//!
//! Every connection gets `ready` first, then a `snapshot` when any unit is known, then
//! every event the broadcaster publishes. The broadcaster subscription lives exactly
//! as long as the response stream: axum drops the stream when the client goes away,
//! which drops the [`SubscriptionGuard`] and unsubscribes.
//!
//! [`SubscriptionGuard`]: crate::broadcast::SubscriptionGuard

use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info};

use crate::api::state::ApiState;
use crate::events::BroadcastEvent;

/// Comment line sent on idle streams so proxies keep them open
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(25);

/// GET /api/stream
pub async fn event_stream(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let (tx, rx) = mpsc::unbounded_channel();

    let _ = tx.send(BroadcastEvent::Ready);

    let forward = tx.clone();
    let guard = state
        .hub
        .broadcaster()
        .subscribe(move |event| {
            forward
                .send(event)
                .map_err(|_| anyhow::anyhow!("stream client disconnected"))
        })
        .into_guard();
    info!("stream client connected");

    let tankers = state.hub.ingress().snapshot();
    if !tankers.is_empty() {
        let _ = tx.send(BroadcastEvent::Snapshot { tankers });
    }
    drop(tx);

    let stream = UnboundedReceiverStream::new(rx).map(move |event| {
        let _subscription = &guard;
        debug!("streaming {} event", event.kind());
        Event::default().json_data(&event)
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping"))
}
