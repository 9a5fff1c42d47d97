use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::sync::mpsc;
use warp::filters::BoxedFilter;
use warp::http::header::{HeaderMap, HeaderName, HeaderValue};
use warp::http::Uri;
use warp::reply::Response;
use warp::{Filter, Reply};

use super::routes;
use super::types::StreamSettings;
use crate::configuration::{Config, ResponseHeader};
use crate::error_handling::types::WebError;
use crate::routing::GatewayEvent;
use crate::storage::LogStorage;

/// Request headers a cross-origin client may send.
const CORS_ALLOWED_HEADERS: [&str; 6] = [
    "accept",
    "authorization",
    "cache-control",
    "content-type",
    "last-event-id",
    "x-requested-with",
];

pub type ServerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// HTTP front end: the SSE stream, the message endpoint, health checks and the optional
/// log view.
pub struct WebServer {
    port: u16,
    sse_path: String,
    message_path: String,
    health_endpoints: Vec<String>,
    logs_path: Option<String>,
    cors: Option<Vec<String>>,
    headers: Vec<ResponseHeader>,
    stream: StreamSettings,
    events: mpsc::Sender<GatewayEvent>,
    storage: Option<Arc<dyn LogStorage>>,
}

impl WebServer {
    /// Create a new WebServer instance
    ///
    /// `storage` backs the log view and is ignored when no logs path is configured.
    pub fn new(
        config: &Config,
        events: mpsc::Sender<GatewayEvent>,
        storage: Option<Arc<dyn LogStorage>>,
    ) -> Result<Self, WebError> {
        let headers = config
            .response_headers()
            .map_err(|e| WebError::InvalidHeader(e.to_string()))?;

        Ok(Self {
            port: config.port,
            sse_path: config.sse_path.clone(),
            message_path: config.message_path.clone(),
            health_endpoints: config.health_endpoints.clone(),
            logs_path: config.logs_path.clone(),
            cors: config.cors.clone(),
            headers,
            stream: StreamSettings {
                message_endpoint: config.message_endpoint(),
                session_buffer: config.session_buffer,
                keep_alive: Duration::from_secs(config.keep_alive_secs),
            },
            events,
            storage,
        })
    }

    /// All routes with configured headers and CORS applied to every response.
    pub fn routes(&self) -> Result<BoxedFilter<(Response,)>, WebError> {
        let mut routes = routes::sse_route(
            self.sse_path.clone(),
            self.stream.clone(),
            self.events.clone(),
        )
        .or(routes::message_route(
            self.message_path.clone(),
            self.events.clone(),
        ))
        .unify()
        .or(routes::health_route(self.health_endpoints.clone()))
        .unify()
        .boxed();

        match (&self.logs_path, &self.storage) {
            (Some(path), Some(storage)) => {
                debug!("Serving log records under {}/<session id>", path);
                routes = routes
                    .or(routes::logs_route(path.clone(), storage.clone()))
                    .unify()
                    .boxed();
            }
            (Some(path), None) => {
                info!("Log store disabled, not serving log records under {}", path);
            }
            _ => {}
        }

        let headers = header_map(&self.headers)?;
        let routes = routes
            .recover(routes::handle_rejection)
            .with(warp::reply::with::headers(headers))
            .map(into_response)
            .boxed();

        match &self.cors {
            None => Ok(routes),
            Some(origins) => Ok(routes
                .with(cors_policy(origins)?)
                .map(into_response)
                .boxed()),
        }
    }

    /// Binds the listening socket and returns the future serving requests.
    pub fn bind(&self) -> Result<(SocketAddr, ServerFuture), WebError> {
        let routes = self.routes()?;
        let (addr, server) = warp::serve(routes)
            .try_bind_ephemeral(([0, 0, 0, 0], self.port))
            .map_err(|e| WebError::BindFailed(e.to_string()))?;

        info!("Listening on port {}", addr.port());
        info!("SSE endpoint: http://localhost:{}{}", addr.port(), self.sse_path);
        info!(
            "POST messages: http://localhost:{}{}",
            addr.port(),
            self.message_path
        );
        Ok((addr, Box::pin(server)))
    }
}

fn into_response<R: Reply>(reply: R) -> Response {
    reply.into_response()
}

fn header_map(headers: &[ResponseHeader]) -> Result<HeaderMap, WebError> {
    let mut map = HeaderMap::new();
    for header in headers {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| WebError::InvalidHeader(format!("{}: {}", header.name, e)))?;
        let value = HeaderValue::from_str(&header.value)
            .map_err(|e| WebError::InvalidHeader(format!("{}: {}", header.name, e)))?;
        map.append(name, value);
    }
    Ok(map)
}

fn cors_policy(origins: &[String]) -> Result<warp::cors::Builder, WebError> {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST", "OPTIONS"])
        .allow_headers(CORS_ALLOWED_HEADERS);

    if origins.is_empty() {
        return Ok(builder.allow_any_origin());
    }
    for origin in origins {
        check_origin(origin)?;
    }
    Ok(builder.allow_origins(origins.iter().map(String::as_str)))
}

/// Accepts `scheme://host[:port]` only.
fn check_origin(origin: &str) -> Result<(), WebError> {
    let bare = origin
        .split_once("://")
        .map_or(false, |(scheme, rest)| {
            !scheme.is_empty() && !rest.is_empty() && !rest.contains('/')
        });
    if bare && origin.parse::<Uri>().is_ok() {
        Ok(())
    } else {
        Err(WebError::InvalidOrigin(origin.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::SessionError;
    use crate::storage::memory_storage::MemoryStorage;
    use crate::storage::LogRecord;
    use crate::session_management::Session;
    use serde_json::{json, Value};
    use tokio::task::JoinHandle;
    use warp::http::StatusCode;

    fn config() -> Config {
        Config {
            stdio: Some("cat".into()),
            health_endpoints: vec!["/healthz".into(), "/ready".into()],
            headers: vec!["X-Gateway: stdiogate".into()],
            ..Config::default()
        }
    }

    /// Answers posts like the router would for a registry holding only `s1`.
    fn fake_router(mut events: mpsc::Receiver<GatewayEvent>) -> JoinHandle<Vec<Vec<u8>>> {
        tokio::spawn(async move {
            let mut accepted = Vec::new();
            while let Some(event) = events.recv().await {
                if let GatewayEvent::ClientPost {
                    session_id,
                    body,
                    reply,
                } = event
                {
                    let outcome = if session_id != "s1" {
                        Err(SessionError::NotFound(session_id))
                    } else {
                        match serde_json::from_slice::<Value>(&body) {
                            Ok(_) => {
                                accepted.push(body);
                                Ok(())
                            }
                            Err(e) => Err(SessionError::InvalidMessage(e.to_string())),
                        }
                    };
                    let _ = reply.send(outcome);
                }
            }
            accepted
        })
    }

    fn server(config: &Config) -> (WebServer, JoinHandle<Vec<Vec<u8>>>) {
        let (events, rx) = mpsc::channel(16);
        let server = WebServer::new(config, events, None).unwrap();
        (server, fake_router(rx))
    }

    #[tokio::test]
    async fn health_endpoints_answer_ok_with_headers() {
        let (server, _router) = server(&config());
        let routes = server.routes().unwrap();

        for path in ["/healthz", "/ready"] {
            let res = warp::test::request().path(path).reply(&routes).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.body(), "ok");
            assert_eq!(res.headers()["x-gateway"], "stdiogate");
        }
    }

    #[tokio::test]
    async fn unknown_path_is_not_found_and_still_decorated() {
        let (server, _router) = server(&config());
        let routes = server.routes().unwrap();

        let res = warp::test::request().path("/nope").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()["x-gateway"], "stdiogate");
    }

    #[tokio::test]
    async fn post_without_session_id_is_rejected() {
        let (server, _router) = server(&config());
        let routes = server.routes().unwrap();

        let res = warp::test::request()
            .method("POST")
            .path("/message")
            .body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body(), "Missing sessionId parameter");
    }

    #[tokio::test]
    async fn post_for_unknown_session_is_unavailable() {
        let (server, _router) = server(&config());
        let routes = server.routes().unwrap();

        let res = warp::test::request()
            .method("POST")
            .path("/message?sessionId=ghost")
            .body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.body(), "No active SSE connection for session ghost");
    }

    #[tokio::test]
    async fn post_with_invalid_json_is_rejected() {
        let (server, _router) = server(&config());
        let routes = server.routes().unwrap();

        let res = warp::test::request()
            .method("POST")
            .path("/message?sessionId=s1")
            .body("{not json")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(res.body()).starts_with("Invalid message: "));
    }

    #[tokio::test]
    async fn accepted_post_reaches_the_router() {
        let (server, router) = server(&config());
        let routes = server.routes().unwrap();

        let res = warp::test::request()
            .method("POST")
            .path("/message?sessionId=s1")
            .body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(res.body(), "Accepted");
        assert_eq!(res.headers()["x-gateway"], "stdiogate");

        drop(routes);
        drop(server);
        let accepted = router.await.unwrap();
        assert_eq!(
            accepted,
            vec![br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_vec()]
        );
    }

    #[tokio::test]
    async fn get_on_message_path_is_method_not_allowed() {
        let (server, _router) = server(&config());
        let routes = server.routes().unwrap();

        let res = warp::test::request().path("/message").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn oversized_post_is_rejected() {
        let (server, _router) = server(&config());
        let routes = server.routes().unwrap();

        let body = vec![b' '; routes::MAX_MESSAGE_BYTES as usize + 1];
        let res = warp::test::request()
            .method("POST")
            .path("/message?sessionId=s1")
            .body(body)
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn sse_stream_announces_endpoint_and_forwards_messages() {
        let mut config = config();
        config.base_url = "http://gw.example".into();
        let (events, mut rx) = mpsc::channel(16);
        let server = WebServer::new(&config, events, None).unwrap();
        let routes = server.routes().unwrap();

        let router = tokio::spawn(async move {
            let session = match rx.recv().await {
                Some(GatewayEvent::SessionOpened(session)) => session,
                other => panic!("unexpected event {:?}", other),
            };
            session.send(&json!({"jsonrpc": "2.0", "method": "hello"})).unwrap();
            let opened = (session.id.clone(), session.source_addr.clone(), session.user_id.clone());
            // Dropping the entry closes the stream after the queued message.
            drop(session);
            let closed = match rx.recv().await {
                Some(GatewayEvent::SessionClosed { session_id, .. }) => session_id,
                other => panic!("unexpected event {:?}", other),
            };
            (opened, closed)
        });

        let res = warp::test::request()
            .path("/sse?userId=alice")
            .remote_addr("10.1.2.3:5000".parse().unwrap())
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "text/event-stream");
        assert_eq!(res.headers()["x-gateway"], "stdiogate");

        let ((id, source_addr, user_id), closed) = router.await.unwrap();
        assert_eq!(source_addr, "10.1.2.3");
        assert_eq!(user_id, "alice");
        assert_eq!(closed, id);

        let body = String::from_utf8_lossy(res.body()).to_string();
        let announce = body.find("endpoint").unwrap();
        let message = body.find("hello").unwrap();
        assert!(announce < message);
        assert!(body.contains(&format!("http://gw.example/message?sessionId={}", id)));
        assert!(body.contains(r#"{"jsonrpc":"2.0","method":"hello"}"#));
    }

    #[tokio::test]
    async fn logs_view_serves_session_records() {
        let mut config = config();
        config.logs_path = Some("/logs".into());
        let storage = Arc::new(MemoryStorage::new());
        let (tx, _rx) = mpsc::channel(1);
        let session = Session::new("s1", tx, "127.0.0.1", "alice");
        storage
            .insert(&LogRecord::system(&session, "booting"))
            .await
            .unwrap();

        let (events, _router_rx) = mpsc::channel(16);
        let server = WebServer::new(&config, events, Some(storage)).unwrap();
        let routes = server.routes().unwrap();

        let res = warp::test::request().path("/logs/s1").reply(&routes).await;
        assert_eq!(res.status(), StatusCode::OK);
        let records: Vec<LogRecord> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, json!("booting"));

        let res = warp::test::request().path("/logs/other").reply(&routes).await;
        assert_eq!(res.body(), "[]");
    }

    #[tokio::test]
    async fn cors_is_applied_when_enabled() {
        let mut config = config();
        config.cors = Some(vec![]);
        let (server, _router) = server(&config);
        let routes = server.routes().unwrap();

        let res = warp::test::request()
            .path("/healthz")
            .header("origin", "https://app.example")
            .reply(&routes)
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(
            res.headers()["access-control-allow-origin"],
            "https://app.example"
        );
    }

    #[tokio::test]
    async fn invalid_origin_is_reported() {
        let mut config = config();
        config.cors = Some(vec!["https://ok.example".into(), "not an origin".into()]);
        let (server, _router) = server(&config);
        assert!(matches!(
            server.routes(),
            Err(WebError::InvalidOrigin(origin)) if origin == "not an origin"
        ));
    }

    #[test]
    fn origins_are_checked() {
        assert!(check_origin("https://a.example").is_ok());
        assert!(check_origin("http://localhost:3000").is_ok());
        assert!(check_origin("https://a.example/").is_err());
        assert!(check_origin("a.example").is_err());
    }

    #[test]
    fn header_values_must_be_valid() {
        let headers = vec![ResponseHeader {
            name: "X-Bad".into(),
            value: "line\nbreak".into(),
        }];
        assert!(matches!(header_map(&headers), Err(WebError::InvalidHeader(_))));
    }

    #[tokio::test]
    async fn bind_reports_the_ephemeral_port() {
        let mut config = config();
        config.port = 0;
        let (server, _router) = server(&config);
        let (addr, serving) = server.bind().unwrap();
        assert_ne!(addr.port(), 0);
        drop(serving);
    }
}
