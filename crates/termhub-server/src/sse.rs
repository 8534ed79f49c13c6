//! Server-sent events transport: one `{output, seq, exit_code}` event per
//! chunk of new output, closed by an event carrying the exit code.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{Stream, StreamExt};
use termhub_pty::{OutputSubscriber, PtySession};

use crate::error::ApiError;
use crate::protocol::{CursorQuery, StreamEvent};
use crate::state::AppState;

/// Payloads for one subscriber, ending after the exit event.
pub fn event_stream(
    session: Arc<PtySession>,
    cursor: u64,
    interval: Duration,
) -> impl Stream<Item = StreamEvent> {
    async_stream::stream! {
        let id = session.id().to_string();
        let mut subscriber = OutputSubscriber::new(session, cursor, interval);
        while let Some(event) = subscriber.next().await {
            yield StreamEvent::from_output(event, subscriber.cursor());
        }
        log::debug!("session {id}: event stream finished");
    }
}

/// GET /terminal/sessions/:id/stream?seq=N
pub async fn stream_output(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CursorQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state.registry.get(&id).await?;
    log::info!("session {id}: event stream attached at seq {}", query.seq);

    let events = event_stream(session, query.seq, state.stream_interval).filter_map(
        |payload| async move {
            match Event::default().json_data(&payload) {
                Ok(event) => Some(Ok::<_, Infallible>(event)),
                Err(e) => {
                    log::warn!("failed to encode stream event: {e}");
                    None
                }
            }
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use termhub_pty::{SessionOptions, SessionRegistry};

    fn spawn(shell: &str) -> Arc<PtySession> {
        PtySession::spawn(SessionOptions {
            shell: shell.to_string(),
            cwd: Some(std::env::temp_dir().display().to_string()),
            ..SessionOptions::default()
        })
        .unwrap()
    }

    async fn collect(session: Arc<PtySession>, cursor: u64) -> Vec<StreamEvent> {
        tokio::time::timeout(
            Duration::from_secs(10),
            event_stream(session, cursor, Duration::from_millis(10)).collect::<Vec<_>>(),
        )
        .await
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stream_ends_with_exit_event() {
        let session = spawn("sh -c 'echo SSE_OUT; exit 3'");

        let events = collect(session, 0).await;
        let (last, output) = events.split_last().unwrap();

        assert_eq!(last.exit_code, Some(3));
        assert!(last.output.is_empty());
        assert!(output.iter().all(|event| event.exit_code.is_none()));

        let text: String = output.iter().map(|event| event.output.as_str()).collect();
        assert!(text.contains("SSE_OUT"), "got: {text}");
        assert_eq!(last.seq, output.last().map_or(0, |event| event.seq));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reattach_with_cursor() {
        let session = spawn("sh -c 'echo SSE_OUT; exit 0'");
        let first = collect(Arc::clone(&session), 0).await;
        let end = first.last().unwrap().seq;

        // Everything was delivered already: only the exit event remains.
        let again = collect(session, end).await;
        assert_eq!(
            again,
            vec![StreamEvent {
                output: String::new(),
                seq: end,
                exit_code: Some(0),
            }]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_session_is_not_found() {
        let state = AppState::new(Arc::new(SessionRegistry::default()), Duration::from_millis(10));
        let result = stream_output(
            State(state),
            Path("missing".to_string()),
            Query(CursorQuery::default()),
        )
        .await;

        match result {
            Err(err) => assert_eq!(err.status(), StatusCode::NOT_FOUND),
            Ok(_) => panic!("expected not found"),
        }
    }
}
