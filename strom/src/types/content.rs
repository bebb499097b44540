//! Text, image, audio and resource content blocks

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{
    helpers::{deserialize_base64_as_bytes, serialize_bytes_as_base64},
    Annotations, Resource, ResourceContents,
};

/// One block of content inside a tool result, prompt or sampling message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Content {
    /// Text content
    #[serde(rename = "text")]
    Text(TextContent),

    /// Image content
    #[serde(rename = "image")]
    Image(ImageContent),

    /// Audio content
    #[serde(rename = "audio")]
    Audio(AudioContent),

    /// Resource link
    #[serde(rename = "resource_link")]
    ResourceLink(Resource),

    /// Embedded resource
    #[serde(rename = "resource")]
    Resource(EmbeddedResource),
}

/// Text provided to or from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// The text content of the message.
    pub text: String,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// An image provided to or from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    /// Base64-encoded image data.
    #[serde(
        serialize_with = "serialize_bytes_as_base64",
        deserialize_with = "deserialize_base64_as_bytes"
    )]
    pub data: Bytes,

    /// The MIME type of the image, e.g. `image/png`.
    #[serde(rename = "mimeType")]
    pub mime_type: String,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// Audio provided to or from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioContent {
    /// Base64-encoded audio data.
    #[serde(
        serialize_with = "serialize_bytes_as_base64",
        deserialize_with = "deserialize_base64_as_bytes"
    )]
    pub data: Bytes,

    /// The MIME type of the audio, e.g. `audio/wav`.
    #[serde(rename = "mimeType")]
    pub mime_type: String,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// The contents of a resource embedded into a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedResource {
    /// The embedded contents.
    pub resource: ResourceContents,

    /// Optional annotations for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl Content {
    /// Creates a text content block.
    #[inline]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent {
            text: text.into(),
            annotations: None,
        })
    }

    /// Returns the inner text when this block is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.text),
            _ => None,
        }
    }
}

impl From<&str> for Content {
    #[inline]
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for Content {
    #[inline]
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_tags_text_content() {
        let content = Content::text("hello");
        let json = serde_json::to_string(&content).unwrap();
        assert_eq!(json, r#"{"type":"text","text":"hello"}"#);
    }

    #[test]
    fn it_round_trips_image_data() {
        let content = Content::Image(ImageContent {
            data: Bytes::from_static(b"\x89PNG"),
            mime_type: "image/png".into(),
            annotations: None,
        });

        let json = serde_json::to_string(&content).unwrap();
        let parsed: Content = serde_json::from_str(&json).unwrap();
        match parsed {
            Content::Image(img) => assert_eq!(&img.data[..], b"\x89PNG"),
            _ => panic!("expected image content"),
        }
    }
}
