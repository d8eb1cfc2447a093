//! Server-Sent Events for workflow progress

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use bovin_common::events::BovinEvent;
use bovin_common::sse::create_event_sse_stream;
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;

use crate::config::MODULE_NAME;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    /// Only events of this workflow (plus record list refreshes)
    pub workflow_id: Option<Uuid>,
}

/// GET /workflows/events
///
/// Streams workflow lifecycle events; `MorphologyRecordsChanged` is always
/// delivered so record lists can refresh.
pub async fn workflow_event_stream(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let wanted = query.workflow_id;
    create_event_sse_stream(MODULE_NAME, &state.event_bus, move |event| {
        match (wanted, event) {
            (None, _) => true,
            (Some(_), BovinEvent::MorphologyRecordsChanged { .. }) => true,
            (Some(id), event) => event.workflow_id() == Some(id),
        }
    })
}
