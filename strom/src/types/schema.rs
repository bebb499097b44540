//! The restricted JSON-Schema subset used by form elicitation

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One top-level property of an elicitation form schema.
///
/// Only flat primitive properties are allowed, without nesting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Schema {
    /// Number property
    Number(NumberSchema),

    /// Boolean property
    Boolean(BooleanSchema),

    /// Single-select enum property; must precede the plain string variant so
    /// the untagged deserializer sees the `enum` member.
    Enum(EnumSchema),

    /// String property
    String(StringSchema),
}

/// A string property.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StringSchema {
    #[serde(rename = "type")]
    r#type: StringTag,

    /// A short label for the field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// A human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Minimum length of the value.
    #[serde(rename = "minLength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    /// Maximum length of the value.
    #[serde(rename = "maxLength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// A semantic format hint: `email`, `uri`, `date` or `date-time`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Pre-filled value the client may apply when the user leaves the field
    /// untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// A number property.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct NumberSchema {
    #[serde(rename = "type")]
    r#type: NumberTag,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Inclusive lower bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Inclusive upper bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

/// A boolean property.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BooleanSchema {
    #[serde(rename = "type")]
    r#type: BooleanTag,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

/// A single-select string enum property.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct EnumSchema {
    #[serde(rename = "type")]
    r#type: StringTag,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The allowed values.
    pub r#enum: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

macro_rules! type_tag {
    ($name:ident, $tag:literal) => {
        #[derive(Debug, Default, Clone, Copy)]
        struct $name;

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str($tag)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                let tag = String::deserialize(d)?;
                if tag == $tag {
                    Ok(Self)
                } else {
                    Err(serde::de::Error::custom(format!(
                        "expected type {:?}, got {tag:?}", $tag
                    )))
                }
            }
        }
    };
}

type_tag!(StringTag, "string");
type_tag!(NumberTag, "number");
type_tag!(BooleanTag, "boolean");

impl Schema {
    /// Creates a plain string property.
    pub fn string() -> Self {
        Self::String(StringSchema::default())
    }

    /// Creates a string property with a description.
    pub fn string_with(description: &str) -> Self {
        Self::String(StringSchema {
            description: Some(description.into()),
            ..Default::default()
        })
    }

    /// Creates a number property.
    pub fn number() -> Self {
        Self::Number(NumberSchema::default())
    }

    /// Creates a boolean property.
    pub fn boolean() -> Self {
        Self::Boolean(BooleanSchema::default())
    }

    /// Creates a single-select enum property.
    pub fn one_of<I: IntoIterator<Item = S>, S: Into<String>>(values: I) -> Self {
        Self::Enum(EnumSchema {
            r#enum: values.into_iter().map(Into::into).collect(),
            ..Default::default()
        })
    }

    /// The declared default value, if any.
    pub fn default_value(&self) -> Option<Value> {
        match self {
            Schema::String(s) => s.default.clone().map(Value::from),
            Schema::Number(n) => n.default.map(|v| serde_json::json!(v)),
            Schema::Boolean(b) => b.default.map(Value::from),
            Schema::Enum(e) => e.default.clone().map(Value::from),
        }
    }
}

impl From<&str> for Schema {
    #[inline]
    fn from(description: &str) -> Self {
        Self::string_with(description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_serializes_type_tags() {
        let json = serde_json::to_value(Schema::string()).unwrap();
        assert_eq!(json["type"], "string");

        let json = serde_json::to_value(Schema::number()).unwrap();
        assert_eq!(json["type"], "number");
    }

    #[test]
    fn it_deserializes_by_type_tag() {
        let schema: Schema = serde_json::from_value(serde_json::json!({
            "type": "boolean",
            "default": true
        })).unwrap();

        assert_eq!(schema.default_value(), Some(Value::Bool(true)));
    }

    #[test]
    fn it_keeps_enum_values() {
        let schema = Schema::one_of(["red", "green"]);
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["enum"], serde_json::json!(["red", "green"]));
    }
}
