//! JSON-Schema validation glue

use serde_json::Value;

use crate::error::{Error, ErrorCode};

/// Validates `instance` against `schema`, reporting the first violation as an
/// invalid-params error prefixed with `what`.
pub(crate) fn validate_against_schema(
    schema: &Value,
    instance: &Value,
    what: &str,
) -> Result<(), Error> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|err| Error::new(
            ErrorCode::InternalError,
            format!("{what}: invalid schema: {err}")))?;

    if let Err(violation) = validator.validate(instance) {
        return Err(Error::new(
            ErrorCode::InvalidParams,
            format!("{what}: {violation}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use super::*;

    #[test]
    fn it_accepts_matching_instances() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "number" } },
            "required": ["a"]
        });

        assert!(validate_against_schema(&schema, &json!({ "a": 5 }), "arguments").is_ok());
    }

    #[test]
    fn it_rejects_mismatches_as_invalid_params() {
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "number" } },
            "required": ["a"]
        });

        let err = validate_against_schema(&schema, &json!({ "a": "five" }), "arguments")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }

    #[test]
    fn it_rejects_missing_required_members() {
        let schema = json!({
            "type": "object",
            "required": ["name"]
        });

        let err = validate_against_schema(&schema, &json!({}), "arguments").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidParams);
    }
}
