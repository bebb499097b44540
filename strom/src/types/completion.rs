//! Argument autocompletion types

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// List of commands for completion
pub mod commands {
    /// Command name that returns autocompletion options.
    pub const COMPLETE: &str = "completion/complete";
}

/// At most this many values go into one completion response.
pub(crate) const MAX_COMPLETION_VALUES: usize = 100;

/// Callback producing completion values for an argument's partial input.
pub(crate) type CompletionCallback = Arc<
    dyn Fn(String) -> BoxFuture<'static, Vec<String>>
    + Send
    + Sync
>;

/// A reference to the prompt or resource template being completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    /// Either `ref/prompt` or `ref/resource`.
    #[serde(rename = "type")]
    pub r#type: String,

    /// The URI template of the resource, for `ref/resource`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// The name of the prompt, for `ref/prompt`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Reference {
    /// Creates a `ref/resource` [`Reference`]
    #[inline]
    pub fn resource(uri: &str) -> Self {
        Self {
            r#type: "ref/resource".into(),
            uri: Some(uri.into()),
            name: None,
        }
    }

    /// Creates a `ref/prompt` [`Reference`]
    #[inline]
    pub fn prompt(name: &str) -> Self {
        Self {
            r#type: "ref/prompt".into(),
            name: Some(name.into()),
            uri: None,
        }
    }
}

/// The argument being completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argument {
    /// The name of the argument.
    pub name: String,

    /// The partial value to complete.
    pub value: String,
}

/// Parameters of `completion/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequestParams {
    /// What is being completed.
    #[serde(rename = "ref")]
    pub r#ref: Reference,

    /// The argument's partial input.
    pub argument: Argument,
}

/// A completion list, capped at 100 values.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Completion {
    /// The completion values; never more than 100.
    pub values: Vec<String>,

    /// The total number of options available, which can exceed `values.len()`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,

    /// Whether options beyond the returned ones exist.
    #[serde(rename = "hasMore", skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

impl Completion {
    /// Builds a completion from all matching values, applying the cap.
    pub fn of(all: Vec<String>) -> Self {
        let total = all.len();
        let has_more = total > MAX_COMPLETION_VALUES;
        let mut values = all;
        values.truncate(MAX_COMPLETION_VALUES);

        Self {
            values,
            total: Some(total),
            has_more: Some(has_more),
        }
    }
}

/// The response to a `completion/complete` request.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    /// The completion values for the referenced argument.
    pub completion: Completion,
}

impl From<Completion> for CompleteResult {
    #[inline]
    fn from(completion: Completion) -> Self {
        Self { completion }
    }
}

crate::types::response::impl_into_response! {
    CompleteResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_caps_values_at_one_hundred() {
        let all: Vec<String> = (0..150).map(|i| i.to_string()).collect();
        let completion = Completion::of(all);

        assert_eq!(completion.values.len(), 100);
        assert_eq!(completion.total, Some(150));
        assert_eq!(completion.has_more, Some(true));
    }

    #[test]
    fn it_reports_no_more_when_under_cap() {
        let completion = Completion::of(vec!["a".into(), "b".into()]);
        assert_eq!(completion.values.len(), 2);
        assert_eq!(completion.total, Some(2));
        assert_eq!(completion.has_more, Some(false));
    }

    #[test]
    fn it_builds_references() {
        let r = Reference::prompt("greet");
        assert_eq!(r.r#type, "ref/prompt");
        assert_eq!(r.name.as_deref(), Some("greet"));

        let r = Reference::resource("res://{name}");
        assert_eq!(r.r#type, "ref/resource");
        assert_eq!(r.uri.as_deref(), Some("res://{name}"));
    }
}
