use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ScalarUnderlyingType;

/// Schema node describing the shape of a value a resource accepts or produces.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "crate::wire::WireDefinition")]
pub struct Definition {
    pub is_required: bool,
    pub is_secret: bool,
    pub rendering: Option<ValueRenderingOptions>,
    pub resource: Option<ResourceOptions>,
    pub kind: DefinitionKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionKind {
    Any,
    Scalar(ScalarDefinition),
    Object(ObjectDefinition),
    Field(FieldDefinition),
    Map(MapDefinition),
    List(ListDefinition),
    FunctionArgument(FunctionArgumentDefinition),
    Function(FunctionDefinition),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRenderingOptions {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub documentation_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub documentation: String,
}

/// Resource lifecycle hints attached to a definition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOptions {
    /// Changing this value forces the resource to be replaced instead of updated.
    #[serde(default)]
    pub replace_on_change: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScalarDefinition {
    pub expected_underlying_type: ScalarUnderlyingType,
    pub is_multi_line: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectDefinition {
    pub name: String,
    pub fields: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub value: Box<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapDefinition {
    pub value: Box<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListDefinition {
    pub value: Box<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArgumentDefinition {
    pub name: String,
    pub value: Box<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub arguments: Vec<Definition>,
    pub value: Box<Definition>,
}

/// Named input slot of a resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDefinition {
    pub name: String,
    pub value: Definition,
}

/// Named output slot of a resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDefinition {
    pub name: String,
    pub value: Definition,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("{kind} definitions have no type signature")]
    Unsupported { kind: &'static str },
}

impl Definition {
    pub const fn new(kind: DefinitionKind) -> Self {
        Self { is_required: false, is_secret: false, rendering: None, resource: None, kind }
    }

    pub fn any() -> Self {
        Self::new(DefinitionKind::Any)
    }

    pub fn scalar(expected_underlying_type: ScalarUnderlyingType) -> Self {
        Self::new(DefinitionKind::Scalar(ScalarDefinition { expected_underlying_type, is_multi_line: false }))
    }

    pub fn list(element: Definition) -> Self {
        Self::new(DefinitionKind::List(ListDefinition { value: Box::new(element) }))
    }

    pub fn map(element: Definition) -> Self {
        Self::new(DefinitionKind::Map(MapDefinition { value: Box::new(element) }))
    }

    /// Create a named object whose fields are `(name, definition)` pairs.
    pub fn object<N: Into<String>>(name: impl Into<String>, fields: impl IntoIterator<Item = (N, Definition)>) -> Self {
        let fields = fields
            .into_iter()
            .map(|(field_name, value)| Self::new(DefinitionKind::Field(FieldDefinition { name: field_name.into(), value: Box::new(value) })))
            .collect();
        Self::new(DefinitionKind::Object(ObjectDefinition { name: name.into(), fields }))
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn secret(mut self) -> Self {
        self.is_secret = true;
        self
    }

    pub fn with_rendering(mut self, rendering: ValueRenderingOptions) -> Self {
        self.rendering = Some(rendering);
        self
    }

    pub fn replace_on_change(mut self) -> Self {
        self.resource = Some(ResourceOptions { replace_on_change: true });
        self
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            DefinitionKind::Any => "any",
            DefinitionKind::Scalar(_) => "scalar",
            DefinitionKind::Object(_) => "object",
            DefinitionKind::Field(_) => "field",
            DefinitionKind::Map(_) => "map",
            DefinitionKind::List(_) => "list",
            DefinitionKind::FunctionArgument(_) => "functionArgument",
            DefinitionKind::Function(_) => "function",
        }
    }

    /// Render a compact type signature such as `string!`, `integer[]` or
    /// `map![string]boolean`.
    ///
    /// Required markers are only rendered when `top_level_required` is set.
    /// Nested definitions always render their own required marker.
    pub fn signature(&self, top_level_required: bool) -> Result<String, SignatureError> {
        let required = if top_level_required && self.is_required { "!" } else { "" };
        let signature = match &self.kind {
            DefinitionKind::Any => "any".to_string(),
            DefinitionKind::Scalar(scalar) => format!("{}{required}", scalar.expected_underlying_type.as_str()),
            DefinitionKind::Object(object) => format!("{}{required}", object.name),
            DefinitionKind::List(list) => format!("{}[]{required}", list.value.signature(true)?),
            DefinitionKind::Map(map) => format!("map{required}[string]{}", map.value.signature(true)?),
            DefinitionKind::Field(_) | DefinitionKind::FunctionArgument(_) | DefinitionKind::Function(_) => {
                return Err(SignatureError::Unsupported { kind: self.kind_name() });
            }
        };
        Ok(signature)
    }
}
