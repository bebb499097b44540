//! Server-initiated LLM sampling types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Content, Role};

/// List of commands for sampling
pub mod commands {
    /// Command name asking the client to run an LLM completion.
    pub const CREATE: &str = "sampling/createMessage";
}

/// One message of a sampling conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// Who speaks the message.
    pub role: Role,

    /// The message content.
    pub content: Content,
}

impl SamplingMessage {
    /// Creates a user-role text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Content::text(text),
        }
    }
}

/// How much server context the client should include in the model prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextInclusion {
    /// No extra context.
    #[serde(rename = "none")]
    None,

    /// Context from the requesting server only.
    #[serde(rename = "thisServer")]
    ThisServer,

    /// Context from every connected server.
    #[serde(rename = "allServers")]
    AllServers,
}

/// A model name fragment the client should prefer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelHint {
    /// A substring of the preferred model's name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The server's advisory model selection preferences.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ModelPreferences {
    /// Ordered name hints, most preferred first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,

    /// How much to weigh cost, 0 to 1.
    #[serde(rename = "costPriority", skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f32>,

    /// How much to weigh latency, 0 to 1.
    #[serde(rename = "speedPriority", skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f32>,

    /// How much to weigh capability, 0 to 1.
    #[serde(rename = "intelligencePriority", skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f32>,
}

/// Parameters of `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequestParams {
    /// The conversation so far.
    pub messages: Vec<SamplingMessage>,

    /// Advisory model preferences.
    #[serde(rename = "modelPreferences", skip_serializing_if = "Option::is_none")]
    pub model_prefs: Option<ModelPreferences>,

    /// An optional system prompt.
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// How much server context to include.
    #[serde(rename = "includeContext", skip_serializing_if = "Option::is_none")]
    pub include_context: Option<ContextInclusion>,

    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    /// The maximum number of tokens to sample.
    #[serde(rename = "maxTokens")]
    pub max_tokens: u64,

    /// Sequences that stop the completion.
    #[serde(rename = "stopSequences", skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Provider-specific metadata passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CreateMessageRequestParams {
    /// Creates params for a single user message.
    pub fn new(text: impl Into<String>, max_tokens: u64) -> Self {
        Self {
            messages: vec![SamplingMessage::user(text)],
            model_prefs: None,
            system_prompt: None,
            include_context: None,
            temperature: None,
            max_tokens,
            stop_sequences: None,
            metadata: None,
        }
    }
}

/// The client's reply to a `sampling/createMessage` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageResult {
    /// Who produced the message; always the assistant in practice.
    pub role: Role,

    /// The sampled content.
    pub content: Content,

    /// The model that produced the completion.
    pub model: String,

    /// Why sampling stopped, e.g. `endTurn` or `maxTokens`.
    #[serde(rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

crate::types::response::impl_into_response! {
    CreateMessageResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_serializes_context_inclusion_tags() {
        assert_eq!(
            serde_json::to_string(&ContextInclusion::ThisServer).unwrap(),
            "\"thisServer\"");
    }

    #[test]
    fn it_round_trips_create_message_params() {
        let params = CreateMessageRequestParams::new("hello", 64);
        let json = serde_json::to_string(&params).unwrap();
        let parsed: CreateMessageRequestParams = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.max_tokens, 64);
        assert_eq!(parsed.messages.len(), 1);
    }
}
