//! Server-Sent Events (SSE) handler.
//!
//! Subscribes to the [`rf_core::events::EventBus`], optionally filters by
//! job, replays recent events for late joiners, and sends keepalive
//! heartbeats.

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use std::collections::HashSet;
use std::convert::Infallible;
use std::time::Duration;

use rf_core::events::Event as BusEvent;
use rf_core::JobId;

use crate::context::AppContext;

/// Number of past events replayed to a new subscriber.
const REPLAY_EVENTS: usize = 50;

/// Optional query parameter for job filtering.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only stream events about this job.
    pub job_id: Option<JobId>,
}

/// GET /api/events -- SSE stream of job lifecycle events.
pub async fn events_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<EventsQuery>,
) -> Sse<impl futures_core::Stream<Item = Result<Event, Infallible>>> {
    let job_filter = params.job_id;

    // Subscribe before snapshotting so nothing falls between the two.
    let mut rx = ctx.event_bus.subscribe();
    let recent = ctx.event_bus.recent_events(REPLAY_EVENTS);

    let stream = async_stream::stream! {
        let mut replayed = HashSet::with_capacity(recent.len());
        for event in recent.into_iter().rev() {
            replayed.insert(event.id);
            if let Some(sse) = to_sse(&event, job_filter) {
                yield Ok(sse);
            }
        }

        let mut heartbeat = tokio::time::interval(Duration::from_secs(15));

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Ok(event) => {
                            // Skip live copies of events already replayed.
                            if replayed.remove(&event.id) {
                                continue;
                            }
                            if let Some(sse) = to_sse(&event, job_filter) {
                                yield Ok(sse);
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            tracing::debug!("SSE client lagged by {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Event::default()
                        .event("heartbeat")
                        .data(r#"{"type":"heartbeat"}"#));
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn to_sse(event: &BusEvent, job_filter: Option<JobId>) -> Option<Event> {
    if job_filter.is_some() && event.payload.job_id() != job_filter {
        return None;
    }
    let data = serde_json::to_string(event).ok()?;
    Some(Event::default().id(event.id.to_string()).data(data))
}
