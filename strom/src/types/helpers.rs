//! Small helpers shared across the wire types

use std::fmt::{self, Display, Formatter};
use std::ops::{Deref, DerefMut};

use base64::{engine::general_purpose, Engine};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Serializes bytes as a base64 string.
#[inline]
pub(crate) fn serialize_bytes_as_base64<S>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = general_purpose::STANDARD.encode(bytes);
    serializer.serialize_str(&encoded)
}

/// Deserializes a base64 string into bytes.
#[inline]
pub(crate) fn deserialize_base64_as_bytes<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let decoded = general_purpose::STANDARD
        .decode(&s)
        .map_err(serde::de::Error::custom)?;
    Ok(Bytes::from(decoded))
}

/// The JSON type of a declared property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// Array type
    Array,

    /// String type
    String,

    /// Number type
    Number,

    /// Integer type
    Integer,

    /// Boolean type
    Boolean,

    /// Object type
    Object,
}

impl Default for PropertyType {
    #[inline]
    fn default() -> Self {
        Self::Object
    }
}

impl Display for PropertyType {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::Array => write!(f, "array"),
            PropertyType::String => write!(f, "string"),
            PropertyType::Number => write!(f, "number"),
            PropertyType::Integer => write!(f, "integer"),
            PropertyType::Boolean => write!(f, "boolean"),
            PropertyType::Object => write!(f, "object"),
        }
    }
}

impl PropertyType {
    /// Whether `value` inhabits this JSON type.
    pub(crate) fn admits(&self, value: &serde_json::Value) -> bool {
        match self {
            PropertyType::Array => value.is_array(),
            PropertyType::String => value.is_string(),
            PropertyType::Number => value.is_number(),
            PropertyType::Integer => value.is_i64() || value.is_u64(),
            PropertyType::Boolean => value.is_boolean(),
            PropertyType::Object => value.is_object(),
        }
    }
}

/// Wraps JSON-typed data.
///
/// Used both to extract typed tool arguments and to return structured
/// content from handlers.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwraps the inner `T`
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: schemars::JsonSchema> Json<T> {
    /// Generates a JSON schema for `T`.
    pub fn schema() -> serde_json::Value {
        serde_json::to_value(schemars::schema_for!(T))
            .unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: Display> Display for Json<T> {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn it_checks_property_types() {
        assert!(PropertyType::String.admits(&json!("x")));
        assert!(PropertyType::Number.admits(&json!(1.5)));
        assert!(PropertyType::Integer.admits(&json!(3)));
        assert!(!PropertyType::Integer.admits(&json!(1.5)));
        assert!(!PropertyType::Boolean.admits(&json!("true")));
    }

    #[test]
    fn it_generates_schema_for_json_wrapper() {
        #[derive(schemars::JsonSchema)]
        #[allow(dead_code)]
        struct Args { a: f64, b: f64 }

        let schema = Json::<Args>::schema();
        assert!(schema["properties"]["a"].is_object());
    }
}
