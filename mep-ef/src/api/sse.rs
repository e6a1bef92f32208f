//! Server-Sent Events for pipeline activity

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /events
///
/// Streams `EventIngested`, `EventEnriched`, `EventRejected` and
/// `WindowClosed` as they happen.
pub async fn event_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    mep_common::sse::pipeline_event_stream("mep-ef", state.event_bus.subscribe())
}
