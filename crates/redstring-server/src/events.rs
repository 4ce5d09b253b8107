//! `GET /events/stream` and `GET /telemetry/stream` — SSE fan-out over
//! the event log: an initial connected marker, then the live broadcast
//! stream, filtered per-request.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::StreamExt;

use redstring_types::Event;

use crate::state::AppState;

fn to_sse(event: &Event) -> SseEvent {
    SseEvent::default().event(event.event_type.clone()).data(serde_json::to_string(event).unwrap_or_default())
}

/// `GET /events/stream` — every event type the core emits, with
/// `isTest: true` entries already dropped at the [`EventLog`] fan-out
/// choke point.
pub async fn events_stream(State(state): State<AppState>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.core.events.subscribe_stream();
    let connected = tokio_stream::once(Ok(SseEvent::default().event("CONNECTED").data("{}")));
    let live = rx.filter_map(|msg| async move { msg.ok().map(|event| Ok(to_sse(&event))) });
    Sse::new(connected.chain(live)).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)))
}

#[derive(Debug, Deserialize, Default)]
pub struct TelemetryQuery {
    pub cid: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub from: Option<u64>,
}

fn matches_telemetry_filter(event: &Event, query: &TelemetryQuery) -> bool {
    if let Some(cid) = &query.cid {
        if event.str_field("cid") != Some(cid.as_str()) {
            return false;
        }
    }
    if let Some(event_type) = &query.event_type {
        if &event.event_type != event_type {
            return false;
        }
    }
    true
}

/// `GET /telemetry/stream?cid=&type=&from=` — a filtered tail: replays
/// matching history since `from` (defaulting to server start), then
/// follows the live stream with the same filter applied.
pub async fn telemetry_stream(State(state): State<AppState>, Query(query): Query<TelemetryQuery>) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let since = query.from.unwrap_or(0);
    let backlog: Vec<Result<SseEvent, Infallible>> = state
        .core
        .events
        .replay_since(since)
        .into_iter()
        .filter(|event| matches_telemetry_filter(event, &query))
        .map(|event| Ok(to_sse(&event)))
        .collect();

    let rx = state.core.events.subscribe_stream();
    let live = rx.filter_map(move |msg| {
        let query_cid = query.cid.clone();
        let query_type = query.event_type.clone();
        async move {
            let event = msg.ok()?;
            let filter = TelemetryQuery { cid: query_cid, event_type: query_type, from: None };
            if matches_telemetry_filter(&event, &filter) {
                Some(Ok(to_sse(&event)))
            } else {
                None
            }
        }
    });

    Sse::new(tokio_stream::iter(backlog).chain(live)).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)))
}
