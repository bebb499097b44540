//! Per-request server context and per-connection state

use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};

use dashmap::DashSet;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use uuid::Uuid;

use crate::app::options::RuntimeMcpOptions;
use crate::error::{Error, ErrorCode};
use crate::session::{RequestOptions, Session};
use crate::tasks::{queue::TaskMessageQueue, store::InMemoryTaskStore};
use crate::types::{
    elicitation, root, sampling, CreateMessageRequestParams, CreateMessageResult,
    ElicitationMode, ElicitRequestParams, ElicitResult, ListRootsResult, LoggingLevel,
    LogMessage, Notification, ProgressNotificationParams, ProgressToken, Request, RequestId,
};

/// Everything a connection keeps besides the engine itself.
pub(crate) struct ConnectionState {
    /// The session id of this connection.
    pub(crate) id: Uuid,

    /// URIs this session subscribed to.
    pub(crate) subscriptions: DashSet<String>,

    /// The minimum severity this session wants to receive; everything when
    /// unset.
    pub(crate) log_level: RwLock<Option<LoggingLevel>>,

    /// The task store of this connection.
    pub(crate) tasks: Arc<InMemoryTaskStore>,

    /// The nested-request queues of this connection's tasks.
    pub(crate) queue: Arc<TaskMessageQueue>,

    /// Flipped by `notifications/initialized`.
    pub(crate) initialized: AtomicBool,
}

impl ConnectionState {
    pub(crate) fn new(id: Uuid) -> Self {
        Self {
            id,
            subscriptions: DashSet::new(),
            log_level: RwLock::new(None),
            tasks: Arc::new(InMemoryTaskStore::default()),
            queue: Arc::new(TaskMessageQueue::default()),
            initialized: AtomicBool::new(false),
        }
    }

    pub(crate) fn dispose(&self) {
        self.tasks.dispose();
    }
}

/// One live connection as seen from the shared server core.
pub(crate) struct ConnectionHandle {
    pub(crate) session: Arc<Session>,
    pub(crate) state: Arc<ConnectionState>,
}

/// The context handed to request handlers.
///
/// Carries the session, the per-connection state and the identity of the
/// inbound request, and is the door for reverse requests to the client.
#[derive(Clone)]
pub struct Context {
    pub(crate) options: RuntimeMcpOptions,
    pub(crate) session: Arc<Session>,
    pub(crate) state: Arc<ConnectionState>,
    pub(crate) request_id: RequestId,
    pub(crate) progress_token: Option<ProgressToken>,
    pub(crate) cancellation: CancellationToken,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("session_id", &self.state.id)
            .field("request_id", &self.request_id)
            .finish()
    }
}

impl Context {
    /// The shared server options.
    #[inline]
    pub fn options(&self) -> RuntimeMcpOptions {
        self.options.clone()
    }

    /// The session id of the connection this request arrived on.
    #[inline]
    pub fn session_id(&self) -> Uuid {
        self.state.id
    }

    /// The id of the inbound request.
    #[inline]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Resolves when the peer cancels this request or the session closes.
    /// Long-running handlers should poll this.
    #[inline]
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancellation.cancelled()
    }

    /// Whether the request was already cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Emits `notifications/progress` bound to this request's token.
    /// A no-op when the request carried no token.
    pub async fn report_progress(&self, progress: f64, total: Option<f64>) -> Result<(), Error> {
        let Some(token) = &self.progress_token else {
            return Ok(());
        };
        self.session
            .send_raw(Notification::progress(ProgressNotificationParams {
                token: token.clone(),
                progress,
                total,
                message: None,
            }).into())
            .await
    }

    /// Requests structured user input from the client.
    pub async fn elicit(&self, params: ElicitRequestParams) -> Result<ElicitResult, Error> {
        self.assert_elicitation_mode(&params)?;
        self.typed_request(elicitation::commands::CREATE, params).await
    }

    /// Asks the client to run an LLM completion.
    pub async fn create_message(
        &self,
        params: CreateMessageRequestParams,
    ) -> Result<CreateMessageResult, Error> {
        self.typed_request(sampling::commands::CREATE, params).await
    }

    /// Asks the client for its current root listing.
    pub async fn list_roots(&self) -> Result<ListRootsResult, Error> {
        self.typed_request(root::commands::LIST, serde_json::json!({})).await
    }

    /// Pings the client.
    pub async fn ping(&self) -> Result<(), Error> {
        let req = Request::new(self.session.next_id(), crate::commands::PING, None);
        self.session.request(req, RequestOptions::default()).await?;
        Ok(())
    }

    /// Emits `notifications/message` unless the session's minimum severity
    /// filters it out.
    pub async fn log(&self, level: LoggingLevel, data: impl Serialize) -> Result<(), Error> {
        let min = *self.state.log_level.read().expect("log level lock");
        if min.is_some_and(|min| level < min) {
            return Ok(());
        }
        self.session
            .notify(Notification::log(LogMessage {
                level,
                logger: None,
                data: serde_json::to_value(data).ok(),
            }))
            .await
    }

    /// Announces that a resource changed to every subscribed session.
    pub fn notify_resource_updated(&self, uri: &str) {
        self.options.notify_resource_updated(uri);
    }

    /// Sends an arbitrary notification to this session's client.
    pub async fn notify(&self, notification: Notification) -> Result<(), Error> {
        self.session.notify(notification).await
    }

    /// Sends a raw reverse request and returns its result value.
    pub(crate) async fn relay(
        &self,
        method: &str,
        params: Value,
        options: RequestOptions,
    ) -> Result<Value, Error> {
        let req = Request::new(self.session.next_id(), method, Some(params));
        let resp = self.session.request(req, options).await?;
        Ok(resp.result)
    }

    async fn typed_request<P, R>(&self, method: &str, params: P) -> Result<R, Error>
    where
        P: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let req = Request::new(
            self.session.next_id(),
            method,
            Some(serde_json::to_value(params)?));
        self.session
            .request(req, RequestOptions::default())
            .await?
            .parse()
    }

    fn assert_elicitation_mode(&self, params: &ElicitRequestParams) -> Result<(), Error> {
        let Some(caps) = self.session.peer_client_capabilities() else {
            return Ok(());
        };
        let Some(elicitation) = caps.elicitation else {
            // Presence is asserted by the engine when the request is sent.
            return Ok(());
        };

        let supported = match params.effective_mode() {
            ElicitationMode::Form => elicitation.form,
            ElicitationMode::Url => elicitation.url,
        };
        if supported {
            return Ok(());
        }

        let mode = match params.effective_mode() {
            ElicitationMode::Form => "form",
            ElicitationMode::Url => "url",
        };
        let message = format!("Client does not support {mode}-mode elicitation");
        if self.session.strict() {
            Err(Error::new(ErrorCode::InvalidRequest, message))
        } else {
            tracing::warn!(logger = "strom", "{message}");
            Ok(())
        }
    }
}
