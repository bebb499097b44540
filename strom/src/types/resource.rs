//! Represents MCP resources and resource templates

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::app::handler::RequestHandler;
use crate::error::Error;
use crate::types::{
    completion::CompletionCallback,
    helpers::{deserialize_base64_as_bytes, serialize_bytes_as_base64},
    request::RequestParamsMeta,
    Annotations, Cursor, Page,
};

/// List of commands for resources
pub mod commands {
    pub const LIST: &str = "resources/list";
    pub const TEMPLATES_LIST: &str = "resources/templates/list";
    pub const READ: &str = "resources/read";
    pub const SUBSCRIBE: &str = "resources/subscribe";
    pub const UNSUBSCRIBE: &str = "resources/unsubscribe";
    pub const UPDATED: &str = "notifications/resources/updated";
    pub const LIST_CHANGED: &str = "notifications/resources/list_changed";
}

/// A concrete resource the server exposes.
#[derive(Clone, Serialize, Deserialize)]
pub struct Resource {
    /// The URI of this resource.
    pub uri: String,

    /// A human-readable name for this resource.
    pub name: String,

    /// A human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// A description of what this resource represents.
    #[serde(rename = "description", skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,

    /// The MIME type of this resource.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,

    /// The size of the raw content in bytes, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(skip, default = "super::enabled_default")]
    pub(crate) enabled: bool,

    /// The read callback for this exact URI.
    #[serde(skip)]
    pub(crate) handler: Option<RequestHandler<ReadResourceResult>>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("uri", &self.uri)
            .field("name", &self.name)
            .finish()
    }
}

impl Resource {
    /// Creates a new [`Resource`] metadata entry.
    pub fn new(uri: &str, name: &str) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            title: None,
            descr: None,
            mime_type: None,
            annotations: None,
            size: None,
            enabled: true,
            handler: None,
        }
    }
}

/// A parameterized family of resources addressed by a URI template.
#[derive(Clone, Serialize, Deserialize)]
pub struct ResourceTemplate {
    /// A URI template (RFC 6570, level 1) such as `res://{name}`.
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,

    /// A human-readable name for the template.
    pub name: String,

    /// A human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// A description of what this template is for.
    #[serde(rename = "description", skip_serializing_if = "Option::is_none")]
    pub descr: Option<String>,

    /// The MIME type of all resources matched by this template, if uniform.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(skip, default = "super::enabled_default")]
    pub(crate) enabled: bool,

    /// The read callback for matching URIs.
    #[serde(skip)]
    pub(crate) handler: Option<RequestHandler<ReadResourceResult>>,

    /// Enumerates the concrete resources this template currently matches.
    #[serde(skip)]
    pub(crate) list: Option<ResourceListCallback>,

    /// Per-argument completion callbacks.
    #[serde(skip)]
    pub(crate) complete: HashMap<String, CompletionCallback>,
}

/// Callback that enumerates a template's concrete resources.
pub(crate) type ResourceListCallback = Arc<
    dyn Fn() -> BoxFuture<'static, Result<Vec<Resource>, Error>>
    + Send
    + Sync
>;

impl std::fmt::Debug for ResourceTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTemplate")
            .field("uri_template", &self.uri_template)
            .field("name", &self.name)
            .finish()
    }
}

impl ResourceTemplate {
    /// Creates a new [`ResourceTemplate`] metadata entry.
    pub fn new(uri_template: &str, name: &str) -> Self {
        Self {
            uri_template: uri_template.into(),
            name: name.into(),
            title: None,
            descr: None,
            mime_type: None,
            enabled: true,
            handler: None,
            list: None,
            complete: HashMap::new(),
        }
    }

    /// Matches a concrete URI against the template, extracting variables.
    ///
    /// Supports level-1 expressions: each `/`-separated segment is a literal,
    /// an `{expression}`, or a literal with one embedded expression.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let mut vars = HashMap::new();
        let pattern = self.uri_template.split('/');
        let mut actual = uri.split('/');

        for expected in pattern {
            let segment = actual.next()?;
            if !match_segment(expected, segment, &mut vars) {
                return None;
            }
        }
        if actual.next().is_some() {
            return None;
        }
        Some(vars)
    }
}

fn match_segment(pattern: &str, actual: &str, vars: &mut HashMap<String, String>) -> bool {
    match (pattern.find('{'), pattern.find('}')) {
        (Some(open), Some(close)) if open < close => {
            let prefix = &pattern[..open];
            let suffix = &pattern[close + 1..];
            let name = &pattern[open + 1..close];

            if actual.len() < prefix.len() + suffix.len()
                || !actual.starts_with(prefix)
                || !actual.ends_with(suffix)
            {
                return false;
            }
            let value = &actual[prefix.len()..actual.len() - suffix.len()];
            vars.insert(name.to_string(), value.to_string());
            true
        }
        _ => pattern == actual,
    }
}

/// The contents of one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    /// Binary contents, base64-encoded on the wire.
    Blob(BlobResourceContents),

    /// Text contents.
    Text(TextResourceContents),
}

/// Text contents of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextResourceContents {
    /// The URI of this resource.
    pub uri: String,

    /// The MIME type, if known.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// The text of the item.
    pub text: String,
}

/// Binary contents of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobResourceContents {
    /// The URI of this resource.
    pub uri: String,

    /// The MIME type, if known.
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// The payload, base64-encoded on the wire.
    #[serde(
        serialize_with = "serialize_bytes_as_base64",
        deserialize_with = "deserialize_base64_as_bytes"
    )]
    pub blob: Bytes,
}

/// Parameters of `resources/list` and `resources/templates/list`.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesRequestParams {
    /// An opaque token representing the current pagination position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

/// The response to a `resources/list` request.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// Known resources, static entries first, then template-provided ones.
    pub resources: Vec<Resource>,

    /// The position to resume from, `None` when this is the last page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

impl From<Page<Resource>> for ListResourcesResult {
    #[inline]
    fn from(page: Page<Resource>) -> Self {
        Self {
            resources: page.items,
            next_cursor: page.next_cursor,
        }
    }
}

/// The response to a `resources/templates/list` request.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
pub struct ListResourceTemplatesResult {
    /// Registered templates in registration order.
    #[serde(rename = "resourceTemplates")]
    pub templates: Vec<ResourceTemplate>,

    /// The position to resume from, `None` when this is the last page.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<Cursor>,
}

impl From<Page<ResourceTemplate>> for ListResourceTemplatesResult {
    #[inline]
    fn from(page: Page<ResourceTemplate>) -> Self {
        Self {
            templates: page.items,
            next_cursor: page.next_cursor,
        }
    }
}

/// Parameters of `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceRequestParams {
    /// The URI to read.
    pub uri: String,

    /// Protocol-level metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestParamsMeta>,

    /// Variables extracted from the matched URI template.
    #[serde(skip)]
    pub vars: HashMap<String, String>,
}

impl ReadResourceRequestParams {
    /// Creates read params for a URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            meta: None,
            vars: HashMap::new(),
        }
    }
}

/// The response to a `resources/read` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// One or more captured contents.
    pub contents: Vec<ResourceContents>,
}

impl ReadResourceResult {
    /// Creates a result with one text item.
    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            contents: vec![ResourceContents::Text(TextResourceContents {
                uri: uri.into(),
                mime_type: Some("text/plain".into()),
                text: text.into(),
            })],
        }
    }

    /// Creates a result with one binary item.
    pub fn blob(uri: impl Into<String>, mime_type: &str, blob: impl Into<Bytes>) -> Self {
        Self {
            contents: vec![ResourceContents::Blob(BlobResourceContents {
                uri: uri.into(),
                mime_type: Some(mime_type.into()),
                blob: blob.into(),
            })],
        }
    }
}

impl From<(String, String)> for ReadResourceResult {
    #[inline]
    fn from((uri, text): (String, String)) -> Self {
        Self::text(uri, text)
    }
}

impl From<ResourceContents> for ReadResourceResult {
    #[inline]
    fn from(contents: ResourceContents) -> Self {
        Self { contents: vec![contents] }
    }
}

impl<T, E> TryFrom<Result<T, E>> for ReadResourceResult
where
    T: Into<ReadResourceResult>,
    E: Into<crate::error::Error>,
{
    type Error = crate::error::Error;

    #[inline]
    fn try_from(value: Result<T, E>) -> Result<Self, Self::Error> {
        value.map(Into::into).map_err(Into::into)
    }
}

/// Parameters of `resources/subscribe` and `resources/unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeRequestParams {
    /// The URI to watch.
    pub uri: String,
}

/// Parameters of `notifications/resources/updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdatedNotificationParams {
    /// The URI that changed.
    pub uri: String,
}

crate::types::response::impl_into_response! {
    ListResourcesResult,
    ListResourceTemplatesResult,
    ReadResourceResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_matches_simple_templates() {
        let template = ResourceTemplate::new("res://{name}", "res");

        let vars = template.matches("res://ada").unwrap();
        assert_eq!(vars["name"], "ada");

        assert!(template.matches("res://a/b").is_none());
        assert!(template.matches("other://ada").is_none());
    }

    #[test]
    fn it_matches_multi_segment_templates() {
        let template = ResourceTemplate::new("files://{dir}/{file}.txt", "files");

        let vars = template.matches("files://docs/readme.txt").unwrap();
        assert_eq!(vars["dir"], "docs");
        assert_eq!(vars["file"], "readme");

        assert!(template.matches("files://docs/readme.md").is_none());
    }

    #[test]
    fn it_matches_literal_segments_exactly() {
        let template = ResourceTemplate::new("db://users/{id}", "user");
        assert!(template.matches("db://users/42").is_some());
        assert!(template.matches("db://orders/42").is_none());
    }

    #[test]
    fn it_round_trips_blob_contents() {
        let result = ReadResourceResult::blob("bin://x", "application/octet-stream", &b"\x00\x01"[..]);
        let json = serde_json::to_string(&result).unwrap();
        let parsed: ReadResourceResult = serde_json::from_str(&json).unwrap();

        match &parsed.contents[0] {
            ResourceContents::Blob(blob) => assert_eq!(&blob.blob[..], b"\x00\x01"),
            _ => panic!("expected blob contents"),
        }
    }

    #[test]
    fn it_distinguishes_text_and_blob_on_parse() {
        let json = r#"{"contents":[{"uri":"res://a","text":"hi"}]}"#;
        let parsed: ReadResourceResult = serde_json::from_str(json).unwrap();
        assert!(matches!(parsed.contents[0], ResourceContents::Text(_)));
    }
}
