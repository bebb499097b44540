//! The streamable HTTP transport
//!
//! One endpoint serving POST (inbound JSON-RPC), GET (a long-lived SSE
//! stream with `Last-Event-ID` resumption), DELETE (session termination) and
//! OPTIONS (CORS). The first POST carrying an `initialize` request allocates
//! a session and a fresh engine+transport pair; every later call names its
//! session through the `mcp-session-id` header.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use axum::Router;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app::ServerCore;
use crate::error::{Error, ErrorCode};
use crate::transport::{Receiver, Sender, Transport, TransportProto};
use crate::types::Message;

pub use event_store::InMemoryEventStore;

pub mod event_store;

/// The session header of the streamable HTTP protocol.
pub(crate) const MCP_SESSION_ID: &str = "mcp-session-id";

/// The SSE resumption header.
pub(crate) const LAST_EVENT_ID: &str = "last-event-id";

/// Accepts or rejects a request based on its headers.
pub type Authenticator = Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>;

/// Configuration of the streamable HTTP transport.
#[derive(Clone)]
pub struct StreamableHttpOptions {
    /// The address to bind, `127.0.0.1:8080` by default.
    pub(crate) addr: String,

    /// The endpoint path, `/mcp` by default.
    pub(crate) path: String,

    /// The SSE keep-alive interval.
    pub(crate) keep_alive: Duration,

    /// Retained events per session; unbounded when unset.
    pub(crate) retention: Option<usize>,

    /// The per-request authorization predicate.
    pub(crate) authenticator: Option<Authenticator>,
}

impl Default for StreamableHttpOptions {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8080".into(),
            path: "/mcp".into(),
            keep_alive: Duration::from_secs(15),
            retention: None,
            authenticator: None,
        }
    }
}

impl StreamableHttpOptions {
    /// Sets the bind address.
    pub fn bind(mut self, addr: &str) -> Self {
        self.addr = addr.into();
        self
    }

    /// Sets the endpoint path.
    pub fn with_path(mut self, path: &str) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the SSE keep-alive interval.
    pub fn with_keep_alive(mut self, interval: Duration) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Bounds the per-session event store to the last `retention` events.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Rejects requests the predicate does not accept with 403.
    pub fn with_authenticator<F>(mut self, authenticator: F) -> Self
    where
        F: Fn(&HeaderMap) -> bool + Send + Sync + 'static,
    {
        self.authenticator = Some(Arc::new(authenticator));
        self
    }
}

/// The engine-facing side of one HTTP session.
pub struct HttpSessionTransport {
    id: Uuid,
    rx: Option<mpsc::UnboundedReceiver<Message>>,
    sender: HttpSessionSender,
}

/// One live GET stream of a session.
struct StreamHandle {
    id: String,
    tx: mpsc::UnboundedSender<(u64, Message)>,
}

/// The outbound half: routes replies to their POST, everything else to the
/// most recently opened SSE stream by way of the event store.
#[derive(Clone)]
pub struct HttpSessionSender {
    post_waiters: Arc<DashMap<crate::types::RequestId, oneshot::Sender<Message>>>,
    events: Arc<InMemoryEventStore>,
    streams: Arc<Mutex<Vec<StreamHandle>>>,
    /// The stream id messages are attributed to while no GET is connected;
    /// follows the most recently opened stream so a resuming client still
    /// catches up on what was produced in between.
    last_stream_id: Arc<Mutex<String>>,
    cancel: CancellationToken,
}

/// The inbound half of one HTTP session.
pub struct HttpSessionReceiver {
    rx: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
}

impl Sender for HttpSessionSender {
    async fn send(&self, msg: Message) -> Result<(), Error> {
        if msg.is_reply() {
            if let Some(id) = msg.id() {
                if let Some((_, waiter)) = self.post_waiters.remove(id) {
                    return waiter
                        .send(msg)
                        .map_err(|_| Error::from(ErrorCode::ConnectionClosed));
                }
            }
        }

        // Server-initiated traffic goes to exactly one stream, recorded
        // under that stream's id; replay after a cursor then never hands out
        // a message that was delivered on another connection.
        let mut streams = self.streams.lock().expect("sse streams lock");
        streams.retain(|stream| !stream.tx.is_closed());

        match streams.last() {
            Some(stream) => {
                let event_id = self.events.append(&stream.id, &msg);
                let _ = stream.tx.send((event_id, msg));
            }
            None => {
                // No consumer right now; record under the last known stream
                // so resumption picks the message up.
                let stream_id = self
                    .last_stream_id
                    .lock().expect("stream id lock")
                    .clone();
                self.events.append(&stream_id, &msg);
            }
        }
        Ok(())
    }
}

impl Receiver for HttpSessionReceiver {
    async fn recv(&mut self) -> Result<Message, Error> {
        tokio::select! {
            msg = self.rx.recv() => msg.ok_or_else(|| Error::from(ErrorCode::ConnectionClosed)),
            _ = self.cancel.cancelled() => Err(Error::from(ErrorCode::ConnectionClosed)),
        }
    }
}

impl Transport for HttpSessionTransport {
    type Sender = HttpSessionSender;
    type Receiver = HttpSessionReceiver;

    fn start(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn session_id(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn split(self) -> (Self::Sender, Self::Receiver) {
        let rx = self.rx.expect("http session transport split twice");
        let cancel = self.sender.cancel.clone();
        (self.sender, HttpSessionReceiver { rx, cancel })
    }
}

/// One live session as seen by the HTTP handlers.
#[derive(Clone)]
struct HttpSessionHandle {
    to_engine: mpsc::UnboundedSender<Message>,
    sender: HttpSessionSender,
}

struct HttpState {
    core: Arc<ServerCore>,
    options: StreamableHttpOptions,
    sessions: DashMap<String, HttpSessionHandle>,
}

/// Serves the streamable HTTP endpoint until the listener fails.
pub(crate) async fn serve(
    core: Arc<ServerCore>,
    options: StreamableHttpOptions,
) -> Result<(), Error> {
    let addr = options.addr.clone();
    let app = router(core, options);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(logger = "strom", "Serving MCP over HTTP on {addr}");
    axum::serve(listener, app).await.map_err(Into::into)
}

/// Builds the endpoint router; unsupported methods answer 405.
pub(crate) fn router(core: Arc<ServerCore>, options: StreamableHttpOptions) -> Router {
    let path = options.path.clone();
    let state = Arc::new(HttpState {
        core,
        options,
        sessions: DashMap::new(),
    });

    Router::new()
        .route(
            &path,
            get(on_get)
                .post(on_post)
                .delete(on_delete)
                .options(on_options),
        )
        .with_state(state)
}

async fn on_options() -> HttpResponse {
    let mut resp = StatusCode::OK.into_response();
    put_cors_headers(resp.headers_mut());
    resp
}

async fn on_post(
    State(state): State<Arc<HttpState>>,
    headers: HeaderMap,
    body: Bytes,
) -> HttpResponse {
    if !state.authorize(&headers) {
        return plain(StatusCode::FORBIDDEN, "Forbidden");
    }

    let msg: Message = match serde_json::from_slice(&body) {
        Ok(msg) => msg,
        Err(err) => return plain(
            StatusCode::BAD_REQUEST,
            &format!("Invalid JSON-RPC message: {err}")),
    };

    let is_initialize =
        matches!(&msg, Message::Request(req) if req.method == crate::commands::INITIALIZE);

    let (session_key, handle) = if is_initialize {
        state.open_session()
    } else {
        let Some(session_key) = header_str(&headers, MCP_SESSION_ID) else {
            return plain(StatusCode::BAD_REQUEST, "Missing mcp-session-id header");
        };
        let Some(handle) = state.sessions.get(&session_key).map(|h| h.clone()) else {
            return plain(StatusCode::NOT_FOUND, "Unknown session");
        };
        (session_key, handle)
    };

    match msg {
        msg @ Message::Request(_) => {
            relay_request(&session_key, &handle, msg, &headers).await
        }
        msg => {
            // Notifications and replies are accepted without a body.
            let _ = handle.to_engine.send(msg);
            let mut resp = StatusCode::ACCEPTED.into_response();
            put_session_header(resp.headers_mut(), &session_key);
            resp
        }
    }
}

/// Feeds a POSTed request into the engine and answers with its reply, as
/// JSON or as a single-event SSE stream depending on the Accept header.
async fn relay_request(
    session_key: &str,
    handle: &HttpSessionHandle,
    msg: Message,
    headers: &HeaderMap,
) -> HttpResponse {
    let Some(id) = msg.id().cloned() else {
        return plain(StatusCode::BAD_REQUEST, "Request without an id");
    };

    let (tx, rx) = oneshot::channel();
    handle.sender.post_waiters.insert(id.clone(), tx);

    if handle.to_engine.send(msg).is_err() {
        handle.sender.post_waiters.remove(&id);
        return plain(StatusCode::NOT_FOUND, "Session closed");
    }

    let reply = tokio::select! {
        reply = rx => match reply {
            Ok(reply) => reply,
            Err(_) => return plain(StatusCode::INTERNAL_SERVER_ERROR, "Reply channel closed"),
        },
        _ = handle.sender.cancel.cancelled() => {
            handle.sender.post_waiters.remove(&id);
            return plain(StatusCode::NOT_FOUND, "Session closed");
        }
    };

    let mut resp = if wants_sse(headers) {
        let event = sse_event(None, &reply);
        let stream = tokio_stream::iter([Ok::<Event, Infallible>(event)]);
        Sse::new(stream).into_response()
    } else {
        let body = serde_json::to_string(&reply).unwrap_or_default();
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        ).into_response()
    };
    put_session_header(resp.headers_mut(), session_key);
    resp
}

async fn on_get(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> HttpResponse {
    if !state.authorize(&headers) {
        return plain(StatusCode::FORBIDDEN, "Forbidden");
    }
    let Some(session_key) = header_str(&headers, MCP_SESSION_ID) else {
        return plain(StatusCode::BAD_REQUEST, "Missing mcp-session-id header");
    };
    let Some(handle) = state.sessions.get(&session_key).map(|h| h.clone()) else {
        return plain(StatusCode::NOT_FOUND, "Unknown session");
    };

    let accept = header_str(&headers, header::ACCEPT.as_str()).unwrap_or_default();
    if !accept.contains("text/event-stream") {
        return plain(StatusCode::NOT_ACCEPTABLE, "The stream endpoint serves text/event-stream");
    }

    let replayed = match header_str(&headers, LAST_EVENT_ID) {
        None => Vec::new(),
        Some(cursor) => {
            let Ok(cursor) = cursor.parse::<u64>() else {
                return plain(StatusCode::BAD_REQUEST, "Malformed Last-Event-ID");
            };
            match handle.sender.events.replay_after(cursor) {
                Ok(entries) => entries,
                Err(err) => return plain(StatusCode::BAD_REQUEST, &err.to_string()),
            }
        }
    };

    // Every GET opens a fresh stream with its own id.
    let stream_id = Uuid::new_v4().simple().to_string();
    *handle.sender.last_stream_id.lock().expect("stream id lock") = stream_id.clone();

    let (tx, rx) = mpsc::unbounded_channel();
    handle.sender.streams
        .lock().expect("sse streams lock")
        .push(StreamHandle { id: stream_id, tx });

    let replayed: Vec<Result<Event, Infallible>> = replayed
        .into_iter()
        .map(|entry| Ok(sse_event(Some(entry.id), &entry.message)))
        .collect();
    let live = UnboundedReceiverStream::new(rx)
        .map(|(id, msg)| Ok(sse_event(Some(id), &msg)));
    let stream = tokio_stream::iter(replayed).chain(live);

    let mut resp = Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.options.keep_alive))
        .into_response();
    put_session_header(resp.headers_mut(), &session_key);
    resp
}

async fn on_delete(State(state): State<Arc<HttpState>>, headers: HeaderMap) -> HttpResponse {
    if !state.authorize(&headers) {
        return plain(StatusCode::FORBIDDEN, "Forbidden");
    }
    let Some(session_key) = header_str(&headers, MCP_SESSION_ID) else {
        return plain(StatusCode::BAD_REQUEST, "Missing mcp-session-id header");
    };
    let Some((_, handle)) = state.sessions.remove(&session_key) else {
        return plain(StatusCode::NOT_FOUND, "Unknown session");
    };

    handle.sender.cancel.cancel();
    StatusCode::OK.into_response()
}

impl HttpState {
    fn authorize(&self, headers: &HeaderMap) -> bool {
        match &self.options.authenticator {
            Some(authenticator) => authenticator(headers),
            None => true,
        }
    }

    /// Allocates a session: a fresh engine+transport pair served on its own
    /// task, registered under a random URL-safe id.
    fn open_session(self: &Arc<Self>) -> (String, HttpSessionHandle) {
        let id = Uuid::new_v4();
        let session_key = id.simple().to_string();

        let (to_engine, rx) = mpsc::unbounded_channel();
        let sender = HttpSessionSender {
            post_waiters: Arc::new(DashMap::new()),
            events: Arc::new(InMemoryEventStore::new(self.options.retention)),
            streams: Arc::new(Mutex::new(Vec::new())),
            last_stream_id: Arc::new(Mutex::new(Uuid::new_v4().simple().to_string())),
            cancel: CancellationToken::new(),
        };
        let handle = HttpSessionHandle { to_engine, sender: sender.clone() };
        let transport = HttpSessionTransport { id, rx: Some(rx), sender };

        self.sessions.insert(session_key.clone(), handle.clone());

        let state = self.clone();
        let key = session_key.clone();
        tokio::spawn(async move {
            if let Err(err) = state.core.clone()
                .serve(TransportProto::HttpSession(transport))
                .await
            {
                tracing::error!(logger = "strom", "HTTP session {key} failed: {err}");
            }
            if let Some((_, handle)) = state.sessions.remove(&key) {
                handle.sender.cancel.cancel();
            }
        });

        (session_key, handle)
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string)
}

fn wants_sse(headers: &HeaderMap) -> bool {
    let accept = header_str(headers, header::ACCEPT.as_str()).unwrap_or_default();
    accept.contains("text/event-stream") && !accept.contains("application/json")
}

fn sse_event(id: Option<u64>, msg: &Message) -> Event {
    let event = Event::default()
        .event("message")
        .data(serde_json::to_string(msg).unwrap_or_default());
    match id {
        Some(id) => event.id(id.to_string()),
        None => event,
    }
}

fn put_session_header(headers: &mut HeaderMap, session_key: &str) {
    if let Ok(value) = HeaderValue::from_str(session_key) {
        headers.insert(HeaderName::from_static(MCP_SESSION_ID), value);
    }
}

fn put_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type, mcp-session-id, last-event-id"));
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("mcp-session-id"));
}

fn plain(status: StatusCode, body: &str) -> HttpResponse {
    (status, body.to_string()).into_response()
}
