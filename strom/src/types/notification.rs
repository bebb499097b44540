//! Utilities for notifications

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorCode};
use crate::types::{ProgressToken, RequestId, Task, JSONRPC_VERSION};

/// List of general-purpose notification names
pub mod commands {
    /// Sent by the client once the initialization handshake finished.
    pub const INITIALIZED: &str = "notifications/initialized";

    /// Withdraws an in-flight request.
    pub const CANCELLED: &str = "notifications/cancelled";

    /// Progress report for a request that carried a progress token.
    pub const PROGRESS: &str = "notifications/progress";

    /// A log record emitted by the server.
    pub const MESSAGE: &str = "notifications/message";

    /// Command name that adjusts the minimum log severity for a session.
    pub const SET_LEVEL: &str = "logging/setLevel";
}

/// A message which does not expect a response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// JSON-RPC protocol version.
    ///
    /// > Note: always 2.0.
    pub jsonrpc: String,

    /// Name of the notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    /// Creates a new [`Notification`]
    #[inline]
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
        }
    }

    /// Creates a notification from a serializable params payload.
    pub fn of(method: &str, params: impl Serialize) -> Self {
        Self::new(method, serde_json::to_value(params).ok())
    }

    /// Creates a `notifications/cancelled` for the given request.
    pub fn cancelled(request_id: RequestId, reason: Option<&str>) -> Self {
        Self::of(commands::CANCELLED, CancelledNotificationParams {
            request_id,
            reason: reason.map(Into::into),
        })
    }

    /// Creates a `notifications/progress`.
    pub fn progress(params: ProgressNotificationParams) -> Self {
        Self::of(commands::PROGRESS, params)
    }

    /// Creates a `notifications/message` log record.
    pub fn log(log: LogMessage) -> Self {
        Self::of(commands::MESSAGE, log)
    }

    /// Creates a `notifications/tasks/status`.
    pub fn task_status(task: &Task) -> Self {
        Self::of(crate::types::task::commands::STATUS, task)
    }

    /// Deserializes `params` into a typed payload.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let value = match &self.params {
            Some(params) => params.clone(),
            None => Value::Object(Default::default()),
        };
        serde_json::from_value(value)
            .map_err(|err| Error::new(ErrorCode::InvalidParams, err.to_string()))
    }
}

/// Parameters of `notifications/cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledNotificationParams {
    /// The id of the request to withdraw.
    #[serde(rename = "requestId")]
    pub request_id: RequestId,

    /// An optional reason, for logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Parameters of `notifications/progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressNotificationParams {
    /// The token the original request carried in `_meta.progressToken`.
    #[serde(rename = "progressToken")]
    pub token: ProgressToken,

    /// Monotonically increasing progress value.
    pub progress: f64,

    /// Total amount of work, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,

    /// An optional human-readable progress message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The severity of a log message.
///
/// Maps to syslog severities as specified in
/// [RFC-5424](https://datatracker.ietf.org/doc/html/rfc5424#section-6.2.1).
/// The variant order is ascending severity, so `Ord` compares severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    /// Detailed debug information, typically only valuable to developers.
    Debug,

    /// Normal operational messages that require no action.
    Info,

    /// Normal but significant events that might deserve attention.
    Notice,

    /// Conditions that are not errors but indicate potential issues.
    Warning,

    /// Error conditions that should be addressed but are not urgent.
    Error,

    /// Critical conditions that require immediate attention.
    Critical,

    /// Action must be taken immediately.
    Alert,

    /// System is unusable.
    Emergency,
}

impl LoggingLevel {
    /// The closest `tracing` level for this severity.
    pub(crate) fn as_tracing(&self) -> tracing::Level {
        match self {
            LoggingLevel::Debug => tracing::Level::DEBUG,
            LoggingLevel::Info | LoggingLevel::Notice => tracing::Level::INFO,
            LoggingLevel::Warning => tracing::Level::WARN,
            _ => tracing::Level::ERROR,
        }
    }
}

/// Payload of `notifications/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessage {
    /// The severity of this log message.
    pub level: LoggingLevel,

    /// An optional name of the logger issuing this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,

    /// The data to be logged, such as a string message or an object.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Parameters of `logging/setLevel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelRequestParams {
    /// The minimum severity the client wants to receive. The server sends all
    /// logs at this level and higher as `notifications/message`.
    pub level: LoggingLevel,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn it_creates_new_notification() {
        let notification = Notification::new("test", Some(json!({ "param": "value" })));

        assert_eq!(notification.jsonrpc, "2.0");
        assert_eq!(notification.method, "test");
    }

    #[test]
    fn it_orders_severities_ascending() {
        assert!(LoggingLevel::Debug < LoggingLevel::Info);
        assert!(LoggingLevel::Info < LoggingLevel::Notice);
        assert!(LoggingLevel::Notice < LoggingLevel::Warning);
        assert!(LoggingLevel::Warning < LoggingLevel::Error);
        assert!(LoggingLevel::Error < LoggingLevel::Critical);
        assert!(LoggingLevel::Critical < LoggingLevel::Alert);
        assert!(LoggingLevel::Alert < LoggingLevel::Emergency);
    }

    #[test]
    fn it_serializes_levels_lowercase() {
        assert_eq!(serde_json::to_string(&LoggingLevel::Emergency).unwrap(), "\"emergency\"");
    }

    #[test]
    fn it_builds_cancelled_notifications() {
        let n = Notification::cancelled(RequestId::Number(3), Some("timeout"));
        let params: CancelledNotificationParams = n.params().unwrap();
        assert_eq!(params.request_id, RequestId::Number(3));
        assert_eq!(params.reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn it_parses_progress_params() {
        let n = Notification::new(commands::PROGRESS, Some(json!({
            "progressToken": "p",
            "progress": 0.5,
            "total": 1.0
        })));
        let params: ProgressNotificationParams = n.params().unwrap();
        assert_eq!(params.token, ProgressToken::String("p".into()));
        assert_eq!(params.total, Some(1.0));
    }
}
