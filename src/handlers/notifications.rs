use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

use crate::models::Notification;
use crate::services::notifications::NotificationEvent;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const REPLAY_COUNT: usize = 10;
const KEEPALIVE_SECS: u64 = 30;

// GET /api/notifications?limit=
#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct NotificationsResponse {
    notifications: Vec<Notification>,
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Json<NotificationsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    Json(NotificationsResponse {
        notifications: state.notifier.history(limit),
    })
}

// DELETE /api/notifications
pub async fn clear_notifications(State(state): State<Arc<AppState>>) -> StatusCode {
    state.notifier.clear();
    StatusCode::NO_CONTENT
}

fn to_sse(event: &NotificationEvent) -> Event {
    let name = match event {
        NotificationEvent::Notification(_) => "notification",
        NotificationEvent::NotificationsCleared => "notifications-cleared",
    };
    let data = serde_json::to_string(event).unwrap_or_default();
    Event::default().event(name).data(data)
}

// GET /api/notifications/stream
pub async fn notification_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before reading history so nothing falls in between
    let rx = state.notifier.subscribe();

    // History is newest first, replay oldest first
    let mut recent = state.notifier.history(REPLAY_COUNT);
    recent.reverse();
    let replay = tokio_stream::iter(recent.into_iter().map(|n| {
        Ok::<_, Infallible>(to_sse(&NotificationEvent::Notification(n)))
    }));

    let live = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => Some(Ok::<_, Infallible>(to_sse(&event))),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "notification subscriber lagged");
            None
        }
    });

    let keepalive = IntervalStream::new(tokio::time::interval(Duration::from_secs(KEEPALIVE_SECS)))
        .map(|_| Ok::<_, Infallible>(Event::default().comment("keepalive")));

    tracing::debug!(subscribers = state.notifier.subscriber_count(), "notification stream opened");
    Sse::new(replay.chain(live).merge(keepalive))
}
