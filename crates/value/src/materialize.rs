use serde_json::Map;
use thiserror::Error;

use crate::{ScalarUnderlyingType, Value, ValueKind};

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("scalar value {serialized:?} is not valid JSON: {source}")]
    InvalidScalar {
        serialized: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("scalar value {serialized:?} does not match declared type {expected}")]
    ScalarTypeMismatch { serialized: String, expected: &'static str },
    #[error("{kind} value must be resolved before it can be converted to JSON")]
    Unresolved { kind: &'static str },
    #[error("expected field inside {container}, found {found}")]
    UnexpectedKind { container: &'static str, found: &'static str },
    #[error("{kind} value cannot be converted to JSON outside its container")]
    Detached { kind: &'static str },
}

impl Value {
    /// Convert a fully resolved value into plain JSON.
    ///
    /// Maps and objects become JSON objects keyed by field name (later
    /// duplicates win), lists become arrays and scalars are parsed and checked
    /// against their declared type.
    pub fn to_json(&self) -> Result<serde_json::Value, MaterializeError> {
        match &self.kind {
            ValueKind::Scalar(scalar) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&scalar.serialized_value).map_err(|source| MaterializeError::InvalidScalar {
                        serialized: scalar.serialized_value.clone(),
                        source,
                    })?;
                let matches = match scalar.underlying_type {
                    ScalarUnderlyingType::String => parsed.is_string(),
                    ScalarUnderlyingType::Integer => parsed.is_i64() || parsed.is_u64(),
                    ScalarUnderlyingType::Float => parsed.is_number() || parsed.is_null(),
                    ScalarUnderlyingType::Boolean => parsed.is_boolean(),
                };
                if !matches {
                    return Err(MaterializeError::ScalarTypeMismatch {
                        serialized: scalar.serialized_value.clone(),
                        expected: scalar.underlying_type.as_str(),
                    });
                }
                Ok(parsed)
            }
            ValueKind::List(list) => list.values.iter().map(Value::to_json).collect::<Result<Vec<_>, _>>().map(serde_json::Value::Array),
            ValueKind::Map(fields) | ValueKind::Object(fields) => {
                let mut object = Map::with_capacity(fields.fields.len());
                for field in &fields.fields {
                    let ValueKind::Field(field) = &field.kind else {
                        return Err(MaterializeError::UnexpectedKind { container: self.kind_name(), found: field.kind_name() });
                    };
                    object.insert(field.name.clone(), field.value.to_json()?);
                }
                Ok(serde_json::Value::Object(object))
            }
            ValueKind::Output(_) | ValueKind::Configuration(_) | ValueKind::Function(_) => {
                Err(MaterializeError::Unresolved { kind: self.kind_name() })
            }
            ValueKind::Field(_) | ValueKind::FunctionArgument(_) => Err(MaterializeError::Detached { kind: self.kind_name() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_object_materializes_to_plain_json() {
        let value = Value::object([
            ("name", Value::string("api")),
            ("replicas", Value::integer(3)),
            ("ratio", Value::float(0.5)),
            ("tags", Value::list([Value::string("a"), Value::string("b")])),
            ("labels", Value::map([("tier", Value::string("web")), ("public", Value::boolean(true))])),
        ]);
        assert_eq!(
            value.to_json().expect("json"),
            json!({
                "name": "api",
                "replicas": 3,
                "ratio": 0.5,
                "tags": ["a", "b"],
                "labels": {"tier": "web", "public": true},
            })
        );
    }

    #[test]
    fn mistyped_scalar_is_rejected() {
        let value = Value::scalar("\"3\"", ScalarUnderlyingType::Integer);
        assert!(matches!(value.to_json(), Err(MaterializeError::ScalarTypeMismatch { expected: "integer", .. })));
    }

    #[test]
    fn references_must_be_resolved_first() {
        let value = Value::list([Value::configuration("region")]);
        assert!(matches!(value.to_json(), Err(MaterializeError::Unresolved { kind: "configuration" })));
    }

    #[test]
    fn resolved_input_carries_json() {
        let input = crate::Input::new("port", Value::integer(8080));
        let resolved = input.to_resolved().expect("resolved");
        assert_eq!(resolved.name, "port");
        assert_eq!(resolved.resolved_value, json!(8080));
    }
}
