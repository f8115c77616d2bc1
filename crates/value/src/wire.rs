//! JSON shape of [`Value`] and [`Definition`] nodes.
//!
//! Both trees travel as flat objects discriminated by `kind`. Encoding writes
//! only the members of the node's kind. Decoding goes through a flat wire
//! struct and then checks that no member of another kind is set.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::definition::{
    Definition, DefinitionKind, FieldDefinition, FunctionArgumentDefinition, FunctionDefinition, ListDefinition, MapDefinition,
    ObjectDefinition, ResourceOptions, ScalarDefinition, ValueRenderingOptions,
};
use crate::{
    ConfigurationValue, FieldValue, FieldsValue, FunctionArgumentValue, FunctionValue, ListValue, OutputValue, ScalarUnderlyingType,
    ScalarValue, Value, ValueKind,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("unknown {tree} kind {kind:?}")]
    UnknownKind { tree: &'static str, kind: String },
    #[error("{field} is not a member of {kind} {tree}s")]
    ForeignMember { tree: &'static str, kind: &'static str, field: &'static str },
    #[error("{kind} {tree} is missing {field}")]
    MissingMember { tree: &'static str, kind: &'static str, field: &'static str },
}

/// Reject every set member that is not in `allowed`.
fn only(tree: &'static str, kind: &'static str, present: &[(&'static str, bool)], allowed: &[&str]) -> Result<(), ShapeError> {
    match present.iter().find(|(field, set)| *set && !allowed.contains(field)) {
        Some((field, _)) => Err(ShapeError::ForeignMember { tree, kind, field }),
        None => Ok(()),
    }
}

fn required<T>(tree: &'static str, kind: &'static str, field: &'static str, member: Option<T>) -> Result<T, ShapeError> {
    member.ok_or(ShapeError::MissingMember { tree, kind, field })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WireValue {
    #[serde(default)]
    is_secret: bool,
    kind: String,
    serialized_value: Option<String>,
    underlying_type: Option<ScalarUnderlyingType>,
    project_id: Option<String>,
    environment_id: Option<String>,
    resource_id: Option<String>,
    output_name: Option<String>,
    value_name: Option<String>,
    values: Option<Vec<Value>>,
    fields: Option<Vec<Value>>,
    name: Option<String>,
    value: Option<Box<Value>>,
    function_name: Option<String>,
    provider_id: Option<String>,
    argument_values: Option<Vec<Value>>,
}

impl WireValue {
    fn present(&self) -> [(&'static str, bool); 14] {
        [
            ("serializedValue", self.serialized_value.is_some()),
            ("underlyingType", self.underlying_type.is_some()),
            ("projectId", self.project_id.is_some()),
            ("environmentId", self.environment_id.is_some()),
            ("resourceId", self.resource_id.is_some()),
            ("outputName", self.output_name.is_some()),
            ("valueName", self.value_name.is_some()),
            ("values", self.values.is_some()),
            ("fields", self.fields.is_some()),
            ("name", self.name.is_some()),
            ("value", self.value.is_some()),
            ("functionName", self.function_name.is_some()),
            ("providerId", self.provider_id.is_some()),
            ("argumentValues", self.argument_values.is_some()),
        ]
    }
}

impl TryFrom<WireValue> for Value {
    type Error = ShapeError;

    fn try_from(wire: WireValue) -> Result<Self, Self::Error> {
        const TREE: &str = "value";
        let present = wire.present();
        let kind = match wire.kind.as_str() {
            "scalar" => {
                only(TREE, "scalar", &present, &["serializedValue", "underlyingType"])?;
                ValueKind::Scalar(ScalarValue {
                    serialized_value: wire.serialized_value.unwrap_or_default(),
                    underlying_type: wire.underlying_type.unwrap_or_default(),
                })
            }
            "output" => {
                only(TREE, "output", &present, &["projectId", "environmentId", "resourceId", "outputName"])?;
                ValueKind::Output(OutputValue {
                    project_id: wire.project_id.unwrap_or_default(),
                    environment_id: wire.environment_id.unwrap_or_default(),
                    resource_id: wire.resource_id.unwrap_or_default(),
                    output_name: wire.output_name.unwrap_or_default(),
                })
            }
            "configuration" => {
                only(TREE, "configuration", &present, &["valueName"])?;
                ValueKind::Configuration(ConfigurationValue { value_name: wire.value_name.unwrap_or_default() })
            }
            "list" => {
                only(TREE, "list", &present, &["values"])?;
                ValueKind::List(ListValue { values: wire.values.unwrap_or_default() })
            }
            "map" => {
                only(TREE, "map", &present, &["fields"])?;
                ValueKind::Map(FieldsValue { fields: wire.fields.unwrap_or_default() })
            }
            "object" => {
                only(TREE, "object", &present, &["fields"])?;
                ValueKind::Object(FieldsValue { fields: wire.fields.unwrap_or_default() })
            }
            "field" => {
                only(TREE, "field", &present, &["name", "value"])?;
                ValueKind::Field(FieldValue {
                    name: required(TREE, "field", "name", wire.name)?,
                    value: required(TREE, "field", "value", wire.value)?,
                })
            }
            "function" => {
                only(TREE, "function", &present, &["functionName", "providerId", "argumentValues"])?;
                ValueKind::Function(FunctionValue {
                    function_name: required(TREE, "function", "functionName", wire.function_name)?,
                    provider_id: wire.provider_id.unwrap_or_default(),
                    argument_values: wire.argument_values.unwrap_or_default(),
                })
            }
            "functionArgument" => {
                only(TREE, "functionArgument", &present, &["name", "value"])?;
                ValueKind::FunctionArgument(FunctionArgumentValue {
                    name: required(TREE, "functionArgument", "name", wire.name)?,
                    value: required(TREE, "functionArgument", "value", wire.value)?,
                })
            }
            other => return Err(ShapeError::UnknownKind { tree: TREE, kind: other.to_string() }),
        };
        Ok(Value { is_secret: wire.is_secret, kind })
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if self.is_secret {
            map.serialize_entry("isSecret", &true)?;
        }
        map.serialize_entry("kind", self.kind_name())?;
        match &self.kind {
            ValueKind::Scalar(scalar) => {
                if !scalar.serialized_value.is_empty() {
                    map.serialize_entry("serializedValue", &scalar.serialized_value)?;
                }
                map.serialize_entry("underlyingType", &scalar.underlying_type)?;
            }
            ValueKind::Output(output) => {
                map.serialize_entry("projectId", &output.project_id)?;
                map.serialize_entry("environmentId", &output.environment_id)?;
                map.serialize_entry("resourceId", &output.resource_id)?;
                map.serialize_entry("outputName", &output.output_name)?;
            }
            ValueKind::Configuration(configuration) => map.serialize_entry("valueName", &configuration.value_name)?,
            ValueKind::List(list) => map.serialize_entry("values", &list.values)?,
            ValueKind::Map(fields) | ValueKind::Object(fields) => map.serialize_entry("fields", &fields.fields)?,
            ValueKind::Field(FieldValue { name, value }) | ValueKind::FunctionArgument(FunctionArgumentValue { name, value }) => {
                map.serialize_entry("name", name)?;
                map.serialize_entry("value", value)?;
            }
            ValueKind::Function(function) => {
                map.serialize_entry("functionName", &function.function_name)?;
                map.serialize_entry("providerId", &function.provider_id)?;
                map.serialize_entry("argumentValues", &function.argument_values)?;
            }
        }
        map.end()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WireDefinition {
    #[serde(default)]
    is_required: bool,
    #[serde(default)]
    is_secret: bool,
    rendering: Option<ValueRenderingOptions>,
    resource: Option<ResourceOptions>,
    kind: String,
    expected_underlying_type: Option<ScalarUnderlyingType>,
    is_multi_line: Option<bool>,
    name: Option<String>,
    fields: Option<Vec<Definition>>,
    arguments: Option<Vec<Definition>>,
    value: Option<Box<Definition>>,
}

impl WireDefinition {
    fn present(&self) -> [(&'static str, bool); 6] {
        [
            ("expectedUnderlyingType", self.expected_underlying_type.is_some()),
            ("isMultiLine", self.is_multi_line.is_some()),
            ("name", self.name.is_some()),
            ("fields", self.fields.is_some()),
            ("arguments", self.arguments.is_some()),
            ("value", self.value.is_some()),
        ]
    }
}

impl TryFrom<WireDefinition> for Definition {
    type Error = ShapeError;

    fn try_from(wire: WireDefinition) -> Result<Self, Self::Error> {
        const TREE: &str = "definition";
        let present = wire.present();
        let kind = match wire.kind.as_str() {
            "any" => {
                only(TREE, "any", &present, &[])?;
                DefinitionKind::Any
            }
            "scalar" => {
                only(TREE, "scalar", &present, &["expectedUnderlyingType", "isMultiLine"])?;
                DefinitionKind::Scalar(ScalarDefinition {
                    expected_underlying_type: wire.expected_underlying_type.unwrap_or_default(),
                    is_multi_line: wire.is_multi_line.unwrap_or_default(),
                })
            }
            "object" => {
                only(TREE, "object", &present, &["name", "fields"])?;
                DefinitionKind::Object(ObjectDefinition {
                    name: required(TREE, "object", "name", wire.name)?,
                    fields: wire.fields.unwrap_or_default(),
                })
            }
            "field" => {
                only(TREE, "field", &present, &["name", "value"])?;
                DefinitionKind::Field(FieldDefinition {
                    name: required(TREE, "field", "name", wire.name)?,
                    value: required(TREE, "field", "value", wire.value)?,
                })
            }
            "map" => {
                only(TREE, "map", &present, &["value"])?;
                DefinitionKind::Map(MapDefinition { value: required(TREE, "map", "value", wire.value)? })
            }
            "list" => {
                only(TREE, "list", &present, &["value"])?;
                DefinitionKind::List(ListDefinition { value: required(TREE, "list", "value", wire.value)? })
            }
            "functionArgument" => {
                only(TREE, "functionArgument", &present, &["name", "value"])?;
                DefinitionKind::FunctionArgument(FunctionArgumentDefinition {
                    name: required(TREE, "functionArgument", "name", wire.name)?,
                    value: required(TREE, "functionArgument", "value", wire.value)?,
                })
            }
            "function" => {
                only(TREE, "function", &present, &["name", "arguments", "value"])?;
                DefinitionKind::Function(FunctionDefinition {
                    name: required(TREE, "function", "name", wire.name)?,
                    arguments: wire.arguments.unwrap_or_default(),
                    value: required(TREE, "function", "value", wire.value)?,
                })
            }
            other => return Err(ShapeError::UnknownKind { tree: TREE, kind: other.to_string() }),
        };
        Ok(Definition {
            is_required: wire.is_required,
            is_secret: wire.is_secret,
            rendering: wire.rendering,
            resource: wire.resource,
            kind,
        })
    }
}

impl Serialize for Definition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if self.is_required {
            map.serialize_entry("isRequired", &true)?;
        }
        if self.is_secret {
            map.serialize_entry("isSecret", &true)?;
        }
        if let Some(rendering) = &self.rendering {
            map.serialize_entry("rendering", rendering)?;
        }
        if let Some(resource) = &self.resource {
            map.serialize_entry("resource", resource)?;
        }
        map.serialize_entry("kind", self.kind_name())?;
        match &self.kind {
            DefinitionKind::Any => {}
            DefinitionKind::Scalar(scalar) => {
                map.serialize_entry("expectedUnderlyingType", &scalar.expected_underlying_type)?;
                if scalar.is_multi_line {
                    map.serialize_entry("isMultiLine", &true)?;
                }
            }
            DefinitionKind::Object(object) => {
                map.serialize_entry("name", &object.name)?;
                map.serialize_entry("fields", &object.fields)?;
            }
            DefinitionKind::Field(FieldDefinition { name, value })
            | DefinitionKind::FunctionArgument(FunctionArgumentDefinition { name, value }) => {
                map.serialize_entry("name", name)?;
                map.serialize_entry("value", value)?;
            }
            DefinitionKind::Map(MapDefinition { value }) | DefinitionKind::List(ListDefinition { value }) => {
                map.serialize_entry("value", value)?;
            }
            DefinitionKind::Function(function) => {
                map.serialize_entry("name", &function.name)?;
                map.serialize_entry("arguments", &function.arguments)?;
                map.serialize_entry("value", &function.value)?;
            }
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_members_are_checked_per_kind() {
        let stray = serde_json::json!({"kind": "list", "value": {"kind": "any"}, "fields": []});
        let error = serde_json::from_value::<Definition>(stray).expect_err("fields is not a list member");
        assert!(error.to_string().contains("fields is not a member of list definitions"), "{error}");

        let missing = serde_json::json!({"kind": "map"});
        let error = serde_json::from_value::<Definition>(missing).expect_err("map needs an element definition");
        assert!(error.to_string().contains("map definition is missing value"), "{error}");
    }

    #[test]
    fn function_definition_survives_encoding() {
        let function = Definition::new(DefinitionKind::Function(FunctionDefinition {
            name: "concat".to_string(),
            arguments: vec![Definition::new(DefinitionKind::FunctionArgument(FunctionArgumentDefinition {
                name: "left".to_string(),
                value: Box::new(Definition::scalar(ScalarUnderlyingType::String)),
            }))
            .required()],
            value: Box::new(Definition::scalar(ScalarUnderlyingType::String)),
        }));
        let encoded = serde_json::to_value(&function).expect("encode");
        assert_eq!(encoded["arguments"][0]["kind"], "functionArgument");
        assert_eq!(encoded["arguments"][0]["isRequired"], true);
        let decoded: Definition = serde_json::from_value(encoded).expect("decode");
        assert_eq!(decoded, function);
    }

    #[test]
    fn secret_members_are_not_foreign() {
        let decoded: Value =
            serde_json::from_str(r#"{"isSecret":true,"kind":"configuration","valueName":"password"}"#).expect("decode");
        assert_eq!(decoded, Value::configuration("password").secret());
    }
}
