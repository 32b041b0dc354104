//! Observer event stream for admin consoles

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::AppState;

/// GET /api/events - SSE stream of every broadcast bus event
///
/// The SSE event name is the bus event type; the data is the same JSON the
/// WebSocket carries.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!("New SSE observer connected");

    let stream = BroadcastStream::new(state.bus().subscribe()).filter_map(|result| async move {
        match result {
            Ok(envelope) => match serde_json::to_string(&envelope.event) {
                Ok(json) => Some(Ok(Event::default()
                    .event(envelope.event.event_type())
                    .data(json))),
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("SSE stream error: {:?}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
