//! Represents MCP prompts

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::handler::RequestHandler;
use crate::error::{Error, ErrorCode};
use crate::types::{
    completion::CompletionCallback,
    helpers::PropertyType,
    request::RequestParamsMeta,
    Content, Cursor, Page, Role,
};

/// List of commands for prompts
pub mod commands {
    pub const LIST: &str = "prompts/list";
    pub const GET: &str = "prompts/get";
    pub const LIST_CHANGED: &str = "notifications/prompts/list_changed";
}

/// A prompt template the server can render.
#[derive(Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// The unique name of the prompt.
    pub name: String,

    /// A human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// A description of what this prompt provides.
    #[serde(rename = "description", skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,

    /// Declared arguments.
    #[serde(rename = "arguments", skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<PromptArgument>>,

    #[serde(skip, default = "super::enabled_default")]
    pub(crate) enabled: bool,

    /// The render callback.
    #[serde(skip)]
    pub(crate) handler: Option<RequestHandler<GetPromptResult>>,

    /// Per-argument completion callbacks.
    #[serde(skip)]
    pub(crate) complete: HashMap<String, CompletionCallback>,
}

impl std::fmt::Debug for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prompt")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish()
    }
}

/// One declared prompt argument.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    /// The name of the argument.
    pub name: String,

    /// A human-readable description.
    #[serde(rename = "description", skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,

    /// Whether the argument must be supplied.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    /// The expected JSON type, checked on `prompts/get` when declared.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub r#type: Option<PropertyType>,
}

impl PromptArgument {
    /// Declares a required argument.
    pub fn required(name: &str) -> Self {
        Self {
            name: name.into(),
            required: true,
            ..Default::default()
        }
    }

    /// Declares an optional argument.
    pub fn optional(name: &str) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Sets the expected JSON type.
    pub fn of_type(mut self, r#type: PropertyType) -> Self {
        self.r#type = Some(r#type);
        self
    }
}

/// One message of a rendered prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Who speaks the message.
    pub role: Role,

    /// The message content.
    pub content: Content,
}

impl PromptMessage {
    /// Creates a user-role text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }

    /// Creates an assistant-role text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::text(text),
        }
    }
}

/// Parameters of `prompts/list`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListPromptsRequestParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// The response to a `prompts/list` request.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListPromptsResult {
    /// Enabled prompts in registration order.
    pub prompts: Vec<Prompt>,

    /// The position to resume from, `None` when this is the last page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

impl From<Page<Prompt>> for ListPromptsResult {
    #[inline]
    fn from(page: Page<Prompt>) -> Self {
        Self {
            prompts: page.items,
            next_cursor: page.next_cursor,
        }
    }
}

/// Parameters of `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPromptRequestParams {
    /// The prompt to render.
    pub name: String,

    /// Argument values.
    #[serde(rename = "arguments", skip_serializing_if = "Option::is_none")]
    pub args: Option<HashMap<String, Value>>,

    /// Protocol-level metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestParamsMeta>,
}

/// The response to a `prompts/get` request.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GetPromptResult {
    /// A description of the rendered prompt.
    #[serde(rename = "description", skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,

    /// The rendered messages.
    pub messages: Vec<PromptMessage>,
}

impl From<Vec<PromptMessage>> for GetPromptResult {
    #[inline]
    fn from(messages: Vec<PromptMessage>) -> Self {
        Self { descr: None, messages }
    }
}

impl From<PromptMessage> for GetPromptResult {
    #[inline]
    fn from(message: PromptMessage) -> Self {
        Self { descr: None, messages: vec![message] }
    }
}

impl From<(String, Role)> for GetPromptResult {
    #[inline]
    fn from((text, role): (String, Role)) -> Self {
        Self {
            descr: None,
            messages: vec![PromptMessage { role, content: Content::text(text) }],
        }
    }
}

impl<T, E> TryFrom<Result<T, E>> for GetPromptResult
where
    T: Into<GetPromptResult>,
    E: Into<Error>,
{
    type Error = Error;

    #[inline]
    fn try_from(value: Result<T, E>) -> Result<Self, Self::Error> {
        value.map(Into::into).map_err(Into::into)
    }
}

impl Prompt {
    /// Validates supplied arguments against the declarations.
    ///
    /// A missing required argument or a type mismatch is an invalid-params
    /// error.
    pub(crate) fn validate_args(&self, args: Option<&HashMap<String, Value>>) -> Result<(), Error> {
        let Some(declared) = &self.args else {
            return Ok(());
        };

        for decl in declared {
            match args.and_then(|args| args.get(&decl.name)) {
                None if decl.required => {
                    return Err(Error::new(
                        ErrorCode::InvalidParams,
                        format!("Missing required argument: {}", decl.name)));
                }
                Some(value) => {
                    if let Some(expected) = decl.r#type {
                        if !expected.admits(value) {
                            return Err(Error::new(
                                ErrorCode::InvalidParams,
                                format!("Argument {} must be of type {expected}", decl.name)));
                        }
                    }
                }
                None => {}
            }
        }
        Ok(())
    }
}

crate::types::response::impl_into_response! {
    ListPromptsResult,
    GetPromptResult,
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    fn prompt_with_args(args: Vec<PromptArgument>) -> Prompt {
        Prompt {
            name: "p".into(),
            title: None,
            descr: None,
            args: Some(args),
            enabled: true,
            handler: None,
            complete: HashMap::new(),
        }
    }

    #[test]
    fn it_rejects_missing_required_arguments() {
        let prompt = prompt_with_args(vec![PromptArgument::required("lang")]);

        let err = prompt.validate_args(None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }

    #[test]
    fn it_rejects_type_mismatches() {
        let prompt = prompt_with_args(vec![
            PromptArgument::required("count").of_type(PropertyType::Number),
        ]);

        let args = HashMap::from([("count".to_string(), json!("three"))]);
        let err = prompt.validate_args(Some(&args)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }

    #[test]
    fn it_accepts_valid_arguments() {
        let prompt = prompt_with_args(vec![
            PromptArgument::required("lang"),
            PromptArgument::optional("style").of_type(PropertyType::String),
        ]);

        let args = HashMap::from([("lang".to_string(), json!("rust"))]);
        assert!(prompt.validate_args(Some(&args)).is_ok());
    }

    #[test]
    fn it_omits_optional_required_flag() {
        let arg = PromptArgument::optional("style");
        let json = serde_json::to_value(&arg).unwrap();
        assert!(json.get("required").is_none());
    }
}
