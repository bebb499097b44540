//! The symmetric protocol engine shared by both sides
//!
//! A [`Session`] owns the pending-request table, the inbound cancellation
//! registry, the outbound id counter and the negotiated peer state of one
//! connection. Both [`crate::App`] and [`crate::Client`] drive their receive
//! loops through it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::commands;
use crate::error::{Error, ErrorCode};
use crate::shared::{InflightRequests, RequestQueue};
use crate::transport::{Sender, TransportSender};
use crate::types::{
    elicitation, notification::ProgressNotificationParams, resource, root, sampling, task, tool,
    prompt, ClientCapabilities, Implementation, Notification, ProgressToken, Request, RequestId,
    Response, ServerCapabilities,
};

/// Default deadline for outbound requests.
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Which side of the protocol this engine plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Client,
    Server,
}

/// The capabilities this endpoint advertised.
pub(crate) enum LocalCapabilities {
    Client(ClientCapabilities),
    Server(ServerCapabilities),
}

/// The capabilities the peer advertised during initialization.
#[derive(Clone)]
pub(crate) enum PeerCapabilities {
    Client(ClientCapabilities),
    Server(ServerCapabilities),
}

/// Negotiated peer identity and capabilities.
#[derive(Clone)]
pub(crate) struct PeerInfo {
    pub(crate) implementation: Option<Implementation>,
    pub(crate) protocol_version: String,
    pub(crate) capabilities: PeerCapabilities,
}

/// Callback receiving progress events of one outbound request.
pub type ProgressCallback = Arc<dyn Fn(ProgressNotificationParams) + Send + Sync>;

/// Per-request options for [`Session::request`].
#[derive(Default, Clone)]
pub struct RequestOptions {
    /// Overrides the engine-wide default deadline.
    pub timeout: Option<Duration>,

    /// Disables the deadline entirely; used by the blocking `tasks/result`
    /// side channel.
    pub no_timeout: bool,

    /// Cancels the request locally and withdraws it on the wire.
    pub cancellation_token: Option<CancellationToken>,

    /// Receives `notifications/progress` events for this request. Setting a
    /// sink also attaches a progress token derived from the request id.
    pub progress: Option<ProgressCallback>,

    /// Restarts the deadline whenever a progress event arrives.
    pub reset_timeout_on_progress: bool,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Removes the deadline.
    pub fn without_timeout(mut self) -> Self {
        self.no_timeout = true;
        self
    }

    /// Sets the cancel signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Sets the progress sink.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressNotificationParams) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Restarts the deadline on progress.
    pub fn reset_timeout_on_progress(mut self) -> Self {
        self.reset_timeout_on_progress = true;
        self
    }
}

/// The protocol state of one connection.
pub(crate) struct Session {
    side: Side,
    strict: bool,
    counter: AtomicI64,
    sender: TransportSender,
    default_timeout: Duration,
    pub(crate) pending: RequestQueue,
    pub(crate) inflight: InflightRequests,
    local: RwLock<Option<LocalCapabilities>>,
    peer: RwLock<Option<PeerInfo>>,
    closed: CancellationToken,
}

impl Session {
    /// Creates the engine for one connection.
    pub(crate) fn new(
        side: Side,
        sender: TransportSender,
        default_timeout: Duration,
        strict: bool,
    ) -> Self {
        Self {
            side,
            strict,
            counter: AtomicI64::new(1),
            sender,
            default_timeout,
            pending: RequestQueue::default(),
            inflight: InflightRequests::default(),
            local: RwLock::new(None),
            peer: RwLock::new(None),
            closed: CancellationToken::new(),
        }
    }

    /// Allocates the next outbound request id.
    #[inline]
    pub(crate) fn next_id(&self) -> RequestId {
        RequestId::Number(self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Whether capability violations fail instead of warning.
    #[inline]
    pub(crate) fn strict(&self) -> bool {
        self.strict
    }

    /// The token that fires when the session closes; inbound handlers hang
    /// their cancellation off it.
    #[inline]
    pub(crate) fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    /// Records the capabilities this endpoint advertises.
    pub(crate) fn set_local_capabilities(&self, caps: LocalCapabilities) {
        *self.local.write().expect("local capabilities lock poisoned") = Some(caps);
    }

    /// Records the peer identity after the initialize exchange.
    pub(crate) fn set_peer(&self, info: PeerInfo) {
        *self.peer.write().expect("peer lock poisoned") = Some(info);
    }

    /// The negotiated peer state, when initialization completed.
    pub(crate) fn peer(&self) -> Option<PeerInfo> {
        self.peer.read().expect("peer lock poisoned").clone()
    }

    /// The peer's server capabilities, when the peer is a server.
    pub(crate) fn peer_server_capabilities(&self) -> Option<ServerCapabilities> {
        match self.peer()?.capabilities {
            PeerCapabilities::Server(caps) => Some(caps),
            PeerCapabilities::Client(_) => None,
        }
    }

    /// The peer's client capabilities, when the peer is a client.
    pub(crate) fn peer_client_capabilities(&self) -> Option<ClientCapabilities> {
        match self.peer()?.capabilities {
            PeerCapabilities::Client(caps) => Some(caps),
            PeerCapabilities::Server(_) => None,
        }
    }

    /// Sends a raw message, bypassing capability checks.
    pub(crate) async fn send_raw(&self, msg: crate::types::Message) -> Result<(), Error> {
        self.sender.send(msg).await
    }

    /// Sends a request and awaits its resolution.
    ///
    /// Exactly one of response, error, timeout, cancellation or
    /// connection-closed resolves the returned future.
    pub(crate) async fn request(
        &self,
        mut req: Request,
        options: RequestOptions,
    ) -> Result<Response, Error> {
        self.assert_request_capability(&req.method)?;

        if self.closed.is_cancelled() {
            return Err(Error::from(ErrorCode::ConnectionClosed));
        }

        let id = req.id.clone();
        if options.progress.is_some() {
            req = req.with_progress_token(&ProgressToken::from(&id));
        }

        let mut pending = self.pending.push(&id);
        if let Err(err) = self.sender.send(req.into()).await {
            self.pending.remove(&id);
            return Err(err);
        }

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let cancel = options
            .cancellation_token
            .clone()
            .unwrap_or_default();

        let sleep = tokio::time::sleep(timeout);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                outcome = &mut pending.response => {
                    return outcome.unwrap_or_else(|_| Err(Error::from(ErrorCode::ConnectionClosed)));
                }
                Some(event) = pending.progress.recv() => {
                    if options.reset_timeout_on_progress {
                        sleep.as_mut().reset(tokio::time::Instant::now() + timeout);
                    }
                    if let Some(callback) = &options.progress {
                        callback(event);
                    }
                }
                _ = cancel.cancelled() => {
                    self.pending.remove(&id);
                    let _ = self.send_raw(Notification::cancelled(id.clone(), None).into()).await;
                    return Err(Error::new(
                        ErrorCode::RequestCancelled,
                        format!("Request {id} was cancelled")));
                }
                _ = self.closed.cancelled() => {
                    self.pending.remove(&id);
                    return Err(Error::from(ErrorCode::ConnectionClosed));
                }
                _ = &mut sleep, if !options.no_timeout => {
                    self.pending.remove(&id);
                    let _ = self.send_raw(
                        Notification::cancelled(id.clone(), Some("timeout")).into()).await;
                    return Err(Error::new(
                        ErrorCode::RequestTimeout,
                        format!("Request {id} timed out after {timeout:?}")));
                }
            }
        }
    }

    /// Sends a notification, fire and forget.
    pub(crate) async fn notify(&self, notification: Notification) -> Result<(), Error> {
        self.assert_notification_capability(&notification.method)?;
        self.sender.send(notification.into()).await
    }

    /// Resolves a pending outbound request with the peer's reply.
    pub(crate) fn handle_reply(&self, id: &RequestId, outcome: Result<Response, Error>) {
        self.pending.complete(id, outcome);
    }

    /// Routes an inbound progress notification to its awaiter.
    pub(crate) fn handle_progress(&self, params: ProgressNotificationParams) {
        if self.pending.is_pending(&params.token) {
            self.pending.progress(params);
        } else {
            tracing::debug!(
                logger = "strom",
                "Dropping progress for unknown token {}", params.token);
        }
    }

    /// Cancels an inbound request named by a peer `notifications/cancelled`.
    pub(crate) fn handle_cancelled(&self, id: &RequestId) {
        self.inflight.cancel(id);
    }

    /// Closes the session: fails every pending awaiter with
    /// connection-closed, cancels inbound handlers and fires the close token.
    pub(crate) fn close(&self) {
        self.closed.cancel();
        self.pending.fail_all(ErrorCode::ConnectionClosed);
    }

    fn assert_request_capability(&self, method: &str) -> Result<(), Error> {
        let missing = {
            let peer = self.peer.read().expect("peer lock poisoned");
            match (&*peer, self.side) {
                // Nothing negotiated yet; only handshake traffic flows here.
                (None, _) => None,
                (Some(info), Side::Client) => match &info.capabilities {
                    PeerCapabilities::Server(caps) => missing_server_capability(method, caps),
                    PeerCapabilities::Client(_) => None,
                },
                (Some(info), Side::Server) => match &info.capabilities {
                    PeerCapabilities::Client(caps) => missing_client_capability(method, caps),
                    PeerCapabilities::Server(_) => None,
                },
            }
        };

        self.report_violation(missing, method)
    }

    fn assert_notification_capability(&self, method: &str) -> Result<(), Error> {
        let missing = {
            let local = self.local.read().expect("local capabilities lock poisoned");
            match &*local {
                None => None,
                Some(LocalCapabilities::Server(caps)) => {
                    missing_server_notification_capability(method, caps)
                }
                Some(LocalCapabilities::Client(caps)) => {
                    missing_client_notification_capability(method, caps)
                }
            }
        };

        self.report_violation(missing, method)
    }

    fn report_violation(&self, missing: Option<&'static str>, method: &str) -> Result<(), Error> {
        let Some(capability) = missing else {
            return Ok(());
        };

        let counterpart = match self.side {
            Side::Client => "Server",
            Side::Server => "Client",
        };
        let message =
            format!("{counterpart} does not support the {capability} capability (required for {method})");

        if self.strict {
            Err(Error::new(ErrorCode::InvalidRequest, message))
        } else {
            tracing::warn!(logger = "strom", "{message}");
            Ok(())
        }
    }
}

/// The capability a client-originated request is gated on, when absent.
fn missing_server_capability(method: &str, caps: &ServerCapabilities) -> Option<&'static str> {
    match method {
        m if m == commands::INITIALIZE || m == commands::PING => None,
        "resources/subscribe" | "resources/unsubscribe" => {
            (!caps.resources.as_ref().is_some_and(|r| r.subscribe)).then_some("resources.subscribe")
        }
        m if m.starts_with("tools/") => caps.tools.is_none().then_some("tools"),
        m if m.starts_with("resources/") => caps.resources.is_none().then_some("resources"),
        m if m.starts_with("prompts/") => caps.prompts.is_none().then_some("prompts"),
        m if m.starts_with("tasks/") => caps.tasks.is_none().then_some("tasks"),
        completion::commands::COMPLETE => caps.completions.is_none().then_some("completions"),
        notification_commands::SET_LEVEL => caps.logging.is_none().then_some("logging"),
        _ => None,
    }
}

/// The capability a server-originated request is gated on, when absent.
fn missing_client_capability(method: &str, caps: &ClientCapabilities) -> Option<&'static str> {
    match method {
        m if m == commands::PING => None,
        sampling::commands::CREATE => caps.sampling.is_none().then_some("sampling"),
        root::commands::LIST => caps.roots.is_none().then_some("roots"),
        elicitation::commands::CREATE => caps.elicitation.is_none().then_some("elicitation"),
        _ => None,
    }
}

/// The capability a server-originated notification is gated on, when absent.
fn missing_server_notification_capability(
    method: &str,
    caps: &ServerCapabilities,
) -> Option<&'static str> {
    match method {
        resource::commands::UPDATED => {
            (!caps.resources.as_ref().is_some_and(|r| r.subscribe)).then_some("resources.subscribe")
        }
        resource::commands::LIST_CHANGED => {
            (!caps.resources.as_ref().is_some_and(|r| r.list_changed))
                .then_some("resources.listChanged")
        }
        tool::commands::LIST_CHANGED => {
            (!caps.tools.as_ref().is_some_and(|t| t.list_changed)).then_some("tools.listChanged")
        }
        prompt::commands::LIST_CHANGED => {
            (!caps.prompts.as_ref().is_some_and(|p| p.list_changed))
                .then_some("prompts.listChanged")
        }
        task::commands::STATUS => caps.tasks.is_none().then_some("tasks"),
        notification_commands::MESSAGE => caps.logging.is_none().then_some("logging"),
        elicitation::commands::COMPLETE => caps.elicitation.is_none().then_some("elicitation"),
        _ => None,
    }
}

/// The capability a client-originated notification is gated on, when absent.
fn missing_client_notification_capability(
    method: &str,
    caps: &ClientCapabilities,
) -> Option<&'static str> {
    match method {
        root::commands::LIST_CHANGED => {
            (!caps.roots.as_ref().is_some_and(|r| r.list_changed)).then_some("roots.listChanged")
        }
        _ => None,
    }
}

use crate::types::completion;
use crate::types::notification::commands as notification_commands;

#[cfg(test)]
mod tests {
    use crate::transport::TransportSender;
    use crate::types::{ResourcesCapability, ToolsCapability};
    use super::*;

    fn client_session() -> Session {
        Session::new(Side::Client, TransportSender::None, DEFAULT_REQUEST_TIMEOUT, true)
    }

    fn with_server_caps(session: &Session, caps: ServerCapabilities) {
        session.set_peer(PeerInfo {
            implementation: None,
            protocol_version: "2025-06-18".into(),
            capabilities: PeerCapabilities::Server(caps),
        });
    }

    #[test]
    fn it_allows_everything_before_negotiation() {
        let session = client_session();
        assert!(session.assert_request_capability("tools/list").is_ok());
    }

    #[test]
    fn it_rejects_requests_missing_peer_capability() {
        let session = client_session();
        with_server_caps(&session, ServerCapabilities::default());

        let err = session.assert_request_capability("tools/list").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        assert!(err.to_string().contains("tools"));
    }

    #[test]
    fn it_allows_requests_with_peer_capability() {
        let session = client_session();
        with_server_caps(&session, ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        });

        assert!(session.assert_request_capability("tools/call").is_ok());
    }

    #[test]
    fn it_gates_subscribe_on_the_subscribe_flag() {
        let session = client_session();
        with_server_caps(&session, ServerCapabilities {
            resources: Some(ResourcesCapability::default()),
            ..Default::default()
        });

        assert!(session.assert_request_capability("resources/read").is_ok());
        let err = session.assert_request_capability("resources/subscribe").unwrap_err();
        assert!(err.to_string().contains("resources.subscribe"));
    }

    #[test]
    fn it_always_allows_ping() {
        let session = client_session();
        with_server_caps(&session, ServerCapabilities::default());
        assert!(session.assert_request_capability("ping").is_ok());
    }

    #[test]
    fn it_gates_server_reverse_requests_on_client_capabilities() {
        let session = Session::new(
            Side::Server, TransportSender::None, DEFAULT_REQUEST_TIMEOUT, true);
        session.set_peer(PeerInfo {
            implementation: None,
            protocol_version: "2025-06-18".into(),
            capabilities: PeerCapabilities::Client(ClientCapabilities::default()),
        });

        let err = session.assert_request_capability("sampling/createMessage").unwrap_err();
        assert!(err.to_string().contains("sampling"));
        assert!(session.assert_request_capability("ping").is_ok());
    }

    #[test]
    fn it_gates_notifications_on_local_capabilities() {
        let session = Session::new(
            Side::Server, TransportSender::None, DEFAULT_REQUEST_TIMEOUT, true);
        session.set_local_capabilities(LocalCapabilities::Server(ServerCapabilities {
            tools: Some(ToolsCapability::default()),
            ..Default::default()
        }));

        let err = session
            .assert_notification_capability("notifications/tools/list_changed")
            .unwrap_err();
        assert!(err.to_string().contains("tools.listChanged"));
    }

    #[test]
    fn it_warns_instead_of_failing_when_relaxed() {
        let session = Session::new(
            Side::Client, TransportSender::None, DEFAULT_REQUEST_TIMEOUT, false);
        with_server_caps(&session, ServerCapabilities::default());

        assert!(session.assert_request_capability("tools/list").is_ok());
    }

    #[tokio::test]
    async fn it_fails_pending_requests_on_close() {
        let session = client_session();
        session.close();

        let req = Request::new(session.next_id(), "ping", None);
        let err = session.request(req, RequestOptions::default()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ConnectionClosed);
    }
}
