use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{future, stream, Stream, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use warp::filters::path::FullPath;
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::reply::{self, Response};
use warp::sse::Event;
use warp::{Filter, Rejection, Reply};

use super::types::{ApiError, StreamSettings};
use crate::error_handling::types::SessionError;
use crate::routing::{CloseReason, GatewayEvent};
use crate::session_management::Session;
use crate::storage::LogStorage;

/// Largest accepted message body.
pub const MAX_MESSAGE_BYTES: u64 = 4 * 1024 * 1024;

/// Matches requests whose whole path equals `path`.
pub fn exact_path(path: String) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path::full()
        .and_then(move |full: FullPath| {
            let matches = full.as_str() == path;
            async move {
                if matches {
                    Ok::<(), Rejection>(())
                } else {
                    Err(warp::reject::not_found())
                }
            }
        })
        .untuple_one()
}

fn with_events(
    events: mpsc::Sender<GatewayEvent>,
) -> impl Filter<Extract = (mpsc::Sender<GatewayEvent>,), Error = Infallible> + Clone {
    warp::any().map(move || events.clone())
}

/// GET on any of `paths` -> `ok`
pub fn health_route(
    paths: Vec<String>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let paths = Arc::new(paths);
    warp::path::full()
        .and_then(move |full: FullPath| {
            let known = paths.iter().any(|path| path == full.as_str());
            async move {
                if known {
                    Ok::<(), Rejection>(())
                } else {
                    Err(warp::reject::not_found())
                }
            }
        })
        .untuple_one()
        .and(warp::get())
        .map(|| "ok".into_response())
}

/// GET <sse path> -> event stream of one new session
pub fn sse_route(
    path: String,
    settings: StreamSettings,
    events: mpsc::Sender<GatewayEvent>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    let settings = Arc::new(settings);
    exact_path(path)
        .and(warp::get())
        .and(warp::addr::remote())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_events(events))
        .and(warp::any().map(move || settings.clone()))
        .and_then(open_event_stream)
}

async fn open_event_stream(
    remote: Option<SocketAddr>,
    query: HashMap<String, String>,
    events: mpsc::Sender<GatewayEvent>,
    settings: Arc<StreamSettings>,
) -> Result<Response, Infallible> {
    let session_id = Uuid::new_v4().to_string();
    let source_addr = remote.map(|addr| addr.ip().to_string()).unwrap_or_default();
    let user_id = query.get("userId").cloned().unwrap_or_default();

    let (tx, rx) = mpsc::channel(settings.session_buffer);
    let session = Session::new(session_id.clone(), tx, source_addr, user_id);
    if events.send(GatewayEvent::SessionOpened(session)).await.is_err() {
        error!("[{}] Router unavailable, refusing event stream", session_id);
        return Ok(
            reply::with_status("Router unavailable", StatusCode::SERVICE_UNAVAILABLE)
                .into_response(),
        );
    }
    info!("[{}] Event stream opened", session_id);

    let endpoint = format!("{}?sessionId={}", settings.message_endpoint, session_id);
    let guard = DisconnectGuard { session_id, events };
    let stream = event_stream(endpoint, rx, guard);
    Ok(
        warp::sse::reply(warp::sse::keep_alive().interval(settings.keep_alive).stream(stream))
            .into_response(),
    )
}

/// The `endpoint` event, then one `message` event per queued message.
///
/// The stream ends when the session's queue is closed by the router; `guard` reports the
/// disconnect once the stream is dropped, whichever side ended it.
fn event_stream(
    endpoint: String,
    messages: mpsc::Receiver<Value>,
    guard: DisconnectGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let announce = stream::once(future::ready(Ok::<_, Infallible>(
        Event::default().event("endpoint").data(endpoint),
    )));
    let forwarded = stream::unfold((messages, guard), |(mut messages, guard)| async move {
        let message = messages.recv().await?;
        let event = Event::default().event("message").data(message.to_string());
        Some((Ok::<_, Infallible>(event), (messages, guard)))
    });
    announce.chain(forwarded)
}

struct DisconnectGuard {
    session_id: String,
    events: mpsc::Sender<GatewayEvent>,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let session_id = std::mem::take(&mut self.session_id);
        debug!("[{}] Event stream dropped", session_id);
        let closed = GatewayEvent::SessionClosed {
            session_id: session_id.clone(),
            reason: CloseReason::Disconnected,
        };
        match self.events.try_send(closed) {
            Ok(()) => {}
            // A full queue must not lose the close: wait for room on a separate task.
            Err(TrySendError::Full(closed)) => match Handle::try_current() {
                Ok(runtime) => {
                    let events = self.events.clone();
                    runtime.spawn(async move {
                        if events.send(closed).await.is_err() {
                            debug!("[{}] Router gone before the close was reported", session_id);
                        }
                    });
                }
                Err(_) => warn!("[{}] Could not report closed event stream", session_id),
            },
            Err(TrySendError::Closed(_)) => {
                debug!("[{}] Router gone, close not reported", session_id)
            }
        }
    }
}

/// POST <message path>?sessionId=<id> -> 202 once the router accepted the message
pub fn message_route(
    path: String,
    events: mpsc::Sender<GatewayEvent>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    exact_path(path)
        .and(warp::post())
        .and(warp::query::<HashMap<String, String>>())
        .and(warp::body::content_length_limit(MAX_MESSAGE_BYTES))
        .and(warp::body::bytes())
        .and(with_events(events))
        .and_then(post_message)
}

async fn post_message(
    query: HashMap<String, String>,
    body: Bytes,
    events: mpsc::Sender<GatewayEvent>,
) -> Result<Response, Infallible> {
    let response = match forward_post(query, body, events).await {
        Ok(()) => reply::with_status("Accepted", StatusCode::ACCEPTED).into_response(),
        Err(e) => reply::with_status(e.to_string(), status_for(&e)).into_response(),
    };
    Ok(response)
}

async fn forward_post(
    query: HashMap<String, String>,
    body: Bytes,
    events: mpsc::Sender<GatewayEvent>,
) -> Result<(), SessionError> {
    let session_id = query
        .get("sessionId")
        .filter(|id| !id.is_empty())
        .cloned()
        .ok_or(SessionError::MissingId)?;

    let (reply, accepted) = oneshot::channel();
    let post = GatewayEvent::ClientPost {
        session_id: session_id.clone(),
        body: body.to_vec(),
        reply,
    };
    if events.send(post).await.is_err() {
        return Err(SessionError::NotFound(session_id));
    }
    accepted
        .await
        .unwrap_or(Err(SessionError::NotFound(session_id)))
}

pub fn status_for(err: &SessionError) -> StatusCode {
    match err {
        SessionError::MissingId | SessionError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
        SessionError::NotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
        SessionError::SendFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET <prefix>/:session_id -> stored log records of the session
pub fn logs_route(
    prefix: String,
    storage: Arc<dyn LogStorage>,
) -> impl Filter<Extract = (Response,), Error = Rejection> + Clone {
    warp::path::full()
        .and_then(move |full: FullPath| {
            let session_id = session_under(&prefix, full.as_str());
            async move { session_id.ok_or_else(warp::reject::not_found) }
        })
        .and(warp::get())
        .and(warp::any().map(move || storage.clone()))
        .and_then(session_logs)
}

fn session_under(prefix: &str, path: &str) -> Option<String> {
    let id = path.strip_prefix(prefix)?.strip_prefix('/')?;
    (!id.is_empty() && !id.contains('/')).then(|| id.to_string())
}

async fn session_logs(
    session_id: String,
    storage: Arc<dyn LogStorage>,
) -> Result<Response, Infallible> {
    match storage.records_for_session(&session_id).await {
        Ok(records) => Ok(reply::json(&records).into_response()),
        Err(e) => {
            error!("[{}] Failed to load log records: {}", session_id, e);
            Ok(reply::with_status(
                reply::json(&ApiError {
                    message: "Failed to load log records".to_string(),
                }),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
            .into_response())
        }
    }
}

/// Turns rejections into plain-text responses so that they pass through the response
/// decorators like any other reply.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not Found")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload Too Large")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Length Required")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
    } else {
        debug!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    };
    Ok(reply::with_status(message, status).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings() -> StreamSettings {
        StreamSettings {
            message_endpoint: "/message".into(),
            session_buffer: 4,
            keep_alive: Duration::from_secs(15),
        }
    }

    #[test]
    fn session_id_is_taken_from_the_last_segment() {
        assert_eq!(session_under("/logs", "/logs/abc"), Some("abc".into()));
        assert_eq!(session_under("/logs", "/logs/"), None);
        assert_eq!(session_under("/logs", "/logs"), None);
        assert_eq!(session_under("/logs", "/logs/a/b"), None);
        assert_eq!(session_under("/logs", "/logsabc"), None);
    }

    #[test]
    fn session_errors_map_to_statuses() {
        assert_eq!(status_for(&SessionError::MissingId), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&SessionError::InvalidMessage("eof".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&SessionError::NotFound("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn exact_path_does_not_match_prefixes() {
        let filter = exact_path("/sse".into()).map(|| "hit");
        assert!(warp::test::request().path("/sse").matches(&filter).await);
        assert!(warp::test::request().path("/sse?userId=a").matches(&filter).await);
        assert!(!warp::test::request().path("/sse/extra").matches(&filter).await);
        assert!(!warp::test::request().path("/").matches(&filter).await);
    }

    #[tokio::test]
    async fn event_stream_announces_then_forwards_and_reports_drop() {
        let (events, mut router) = mpsc::channel(4);
        let (tx, rx) = mpsc::channel(4);
        let guard = DisconnectGuard {
            session_id: "s1".into(),
            events,
        };
        let mut stream = Box::pin(event_stream("/message?sessionId=s1".into(), rx, guard));

        assert!(stream.next().await.unwrap().is_ok());
        tx.send(serde_json::json!({"id": 1})).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(router.try_recv().is_err());

        drop(stream);
        match router.try_recv().unwrap() {
            GatewayEvent::SessionClosed { session_id, reason } => {
                assert_eq!(session_id, "s1");
                assert_eq!(reason, CloseReason::Disconnected);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn event_stream_ends_when_session_queue_closes() {
        let (events, mut router) = mpsc::channel(4);
        let (tx, rx) = mpsc::channel(4);
        let guard = DisconnectGuard {
            session_id: "s1".into(),
            events,
        };
        let mut stream = Box::pin(event_stream("/message?sessionId=s1".into(), rx, guard));
        drop(tx);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        assert!(matches!(
            router.try_recv(),
            Ok(GatewayEvent::SessionClosed { .. })
        ));
    }

    #[tokio::test]
    async fn disconnect_is_reported_when_the_event_queue_is_full() {
        let (events, mut router) = mpsc::channel(1);
        events
            .try_send(GatewayEvent::ChildOutput {
                stream: crate::data_capture::StdioStream::Stdout,
                chunk: b"queued\n".to_vec(),
            })
            .unwrap();
        let (_tx, rx) = mpsc::channel(4);
        let guard = DisconnectGuard {
            session_id: "s1".into(),
            events,
        };
        drop(event_stream("/message?sessionId=s1".into(), rx, guard));

        assert!(matches!(
            router.recv().await,
            Some(GatewayEvent::ChildOutput { .. })
        ));
        let closed = tokio::time::timeout(Duration::from_secs(2), router.recv())
            .await
            .expect("close of s1 was not reported");
        match closed {
            Some(GatewayEvent::SessionClosed { session_id, reason }) => {
                assert_eq!(session_id, "s1");
                assert_eq!(reason, CloseReason::Disconnected);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn sse_route_refuses_when_router_is_gone() {
        let (events, router) = mpsc::channel(4);
        drop(router);
        let filter = sse_route("/sse".into(), settings(), events);

        let res = warp::test::request().path("/sse").reply(&filter).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
