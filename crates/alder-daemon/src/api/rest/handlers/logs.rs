//! Event log handlers: recent window and live SSE stream.

use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use alder_types::Severity;
use axum::extract::{Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
    /// Minimum severity, e.g. `high`.
    pub level: Option<String>,
    /// Event domain filter, e.g. `error`.
    pub domain: Option<String>,
}

fn default_limit() -> u64 {
    50
}

/// `GET /logs/recent?limit&level&domain`.
pub async fn recent_logs(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Json<Vec<Value>>> {
    let min_severity = query.level.as_deref().and_then(Severity::parse);
    let entries = state
        .runtime
        .audit()
        .read_recent(query.limit.max(1) * 4)
        .await
        .map_err(alder_types::CoreError::from)?;

    let events: Vec<Value> = entries
        .iter()
        .filter(|e| {
            min_severity.map_or(true, |min| e.event.severity >= min)
                && query
                    .domain
                    .as_deref()
                    .map_or(true, |d| e.event.event_type.domain() == d)
        })
        .rev()
        .take(query.limit as usize)
        .map(|e| {
            json!({
                "sequence": e.sequence,
                "event": e.event,
            })
        })
        .collect();
    Ok(Json(events))
}

/// `GET /logs/stream`: live event stream via SSE.
pub async fn stream_logs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(event) => {
                let json = serde_json::to_string(&event).unwrap_or_default();
                Some((Ok(SseEvent::default().data(json)), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                // Client lagged behind, continue
                Some((Ok(SseEvent::default().comment("lagged")), rx))
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => None,
        }
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
