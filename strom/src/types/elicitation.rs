//! Server-initiated structured user input

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorCode};
use crate::types::{helpers::PropertyType, Schema};

/// List of commands for elicitation
pub mod commands {
    /// Command name asking the client for structured user input.
    pub const CREATE: &str = "elicitation/create";

    /// Notification name announcing that an out-of-band elicitation finished.
    pub const COMPLETE: &str = "notifications/elicitation/complete";
}

/// How the user input is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationMode {
    /// In-band: the client renders a form from the requested schema.
    Form,

    /// Out-of-band: the user visits a URL; completion is announced via
    /// `notifications/elicitation/complete`.
    Url,
}

/// Parameters of `elicitation/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitRequestParams {
    /// The message to present to the user.
    pub message: String,

    /// The collection mode; absent means form.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ElicitationMode>,

    /// The requested form schema.
    ///
    /// > **Note:** a restricted subset of JSON Schema; only flat top-level
    /// > properties are allowed.
    #[serde(rename = "requestedSchema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<RequestSchema>,

    /// The URL to visit, for URL mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// An id correlating the out-of-band elicitation with its completion
    /// notification.
    #[serde(rename = "elicitationId", skip_serializing_if = "Option::is_none")]
    pub elicitation_id: Option<String>,
}

impl ElicitRequestParams {
    /// Creates a form-mode elicitation.
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            mode: None,
            schema: Some(RequestSchema::new()),
            url: None,
            elicitation_id: None,
        }
    }

    /// Creates a URL-mode elicitation.
    pub fn url(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            mode: Some(ElicitationMode::Url),
            schema: None,
            url: Some(url.into()),
            elicitation_id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// The effective mode.
    #[inline]
    pub fn effective_mode(&self) -> ElicitationMode {
        self.mode.unwrap_or(ElicitationMode::Form)
    }

    /// Adds a single optional property to the form schema.
    pub fn with_prop(mut self, prop: &str, schema: impl Into<Schema>) -> Self {
        self.schema = Some(self.schema
            .unwrap_or_default()
            .with_prop(prop, schema));
        self
    }

    /// Adds a single required property to the form schema.
    pub fn with_required(mut self, prop: &str, schema: impl Into<Schema>) -> Self {
        self.schema = Some(self.schema
            .unwrap_or_default()
            .with_required(prop, schema));
        self
    }
}

/// The flat object schema of a form elicitation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSchema {
    /// The type of the schema.
    ///
    /// > **Note:** always "object".
    #[serde(rename = "type", default)]
    pub r#type: PropertyType,

    /// The properties of the schema.
    pub properties: HashMap<String, Schema>,

    /// The required property names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

impl Default for RequestSchema {
    #[inline]
    fn default() -> Self {
        Self {
            r#type: PropertyType::Object,
            properties: HashMap::new(),
            required: None,
        }
    }
}

impl RequestSchema {
    /// Creates an empty [`RequestSchema`]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single optional property.
    pub fn with_prop(mut self, prop: &str, schema: impl Into<Schema>) -> Self {
        self.properties.insert(prop.into(), schema.into());
        self
    }

    /// Adds a single required property.
    pub fn with_required(mut self, prop: &str, schema: impl Into<Schema>) -> Self {
        self = self.with_prop(prop, schema);
        self.required
            .get_or_insert_with(Vec::new)
            .push(prop.into());
        self
    }

    /// Fills missing content keys with the properties' declared defaults.
    pub(crate) fn apply_defaults(&self, content: &mut HashMap<String, Value>) {
        for (name, schema) in &self.properties {
            if !content.contains_key(name) {
                if let Some(default) = schema.default_value() {
                    content.insert(name.clone(), default);
                }
            }
        }
    }
}

/// The user's decision in response to an elicitation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    /// User submitted the form / confirmed the action.
    Accept,

    /// User explicitly declined the action.
    Decline,

    /// User dismissed without making an explicit choice.
    Cancel,
}

/// The client's reply to an `elicitation/create` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitResult {
    /// The user action.
    pub action: ElicitationAction,

    /// The submitted form data; typically absent unless the action is accept.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<HashMap<String, Value>>,
}

impl ElicitResult {
    /// Creates an accepting result with content.
    pub fn accept(content: HashMap<String, Value>) -> Self {
        Self {
            action: ElicitationAction::Accept,
            content: Some(content),
        }
    }

    /// Creates a declining result.
    pub fn decline() -> Self {
        Self {
            action: ElicitationAction::Decline,
            content: None,
        }
    }
}

/// Parameters of `notifications/elicitation/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitationCompleteNotificationParams {
    /// The id of the out-of-band elicitation that finished.
    #[serde(rename = "elicitationId")]
    pub elicitation_id: String,
}

/// One unsatisfied URL elicitation reported through the `-32042` error data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingElicitation {
    /// The URL the user must visit.
    pub url: String,

    /// The elicitation id to watch for completion.
    #[serde(rename = "elicitationId")]
    pub elicitation_id: String,

    /// The message describing what is being asked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Error {
    /// Creates the `-32042` error whose data lists pending URL elicitations
    /// the caller must satisfy before retrying.
    pub fn url_elicitation_required(pending: Vec<PendingElicitation>) -> Error {
        let data = serde_json::json!({ "elicitations": pending });
        Error::new(ErrorCode::UrlElicitationRequired, "URL elicitation required")
            .with_data(data)
    }
}

crate::types::response::impl_into_response! {
    ElicitResult,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn it_builds_form_params() {
        let params = ElicitRequestParams::new("What is your name?")
            .with_required("name", Schema::string());

        assert_eq!(params.effective_mode(), ElicitationMode::Form);
        let schema = params.schema.unwrap();
        assert!(schema.properties.contains_key("name"));
        assert_eq!(schema.required.unwrap(), vec!["name"]);
    }

    #[test]
    fn it_builds_url_params_with_fresh_id() {
        let params = ElicitRequestParams::url("Authorize", "https://example.com/auth");
        assert_eq!(params.effective_mode(), ElicitationMode::Url);
        assert!(params.elicitation_id.is_some());
    }

    #[test]
    fn it_applies_schema_defaults() {
        let schema = RequestSchema::new()
            .with_prop("color", Schema::one_of(["red", "green"]))
            .with_prop("name", Schema::string());

        let schema = RequestSchema {
            properties: schema.properties.into_iter().map(|(k, mut v)| {
                if k == "color" {
                    if let Schema::Enum(e) = &mut v {
                        e.default = Some("red".into());
                    }
                }
                (k, v)
            }).collect(),
            ..RequestSchema::new()
        };

        let mut content = HashMap::from([("name".to_string(), json!("Ada"))]);
        schema.apply_defaults(&mut content);

        assert_eq!(content["color"], json!("red"));
        assert_eq!(content["name"], json!("Ada"));
    }

    #[test]
    fn it_reports_pending_elicitations_in_error_data() {
        let err = Error::url_elicitation_required(vec![PendingElicitation {
            url: "https://example.com".into(),
            elicitation_id: "e1".into(),
            message: None,
        }]);

        assert_eq!(err.code(), ErrorCode::UrlElicitationRequired);
        assert_eq!(err.data().unwrap()["elicitations"][0]["elicitationId"], "e1");
    }
}
