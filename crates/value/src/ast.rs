use serde::{Deserialize, Serialize};

/// A node in the value expression tree.
///
/// The secret flag is orthogonal to the kind and survives every encoding
/// round trip. On the wire the node is a JSON object discriminated by its
/// `kind` member, with `isSecret` present only when set. Decoding rejects
/// members that do not belong to the node's kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "crate::wire::WireValue")]
pub struct Value {
    pub is_secret: bool,
    pub kind: ValueKind,
}

/// The closed set of value kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueKind {
    Scalar(ScalarValue),
    Output(OutputValue),
    Configuration(ConfigurationValue),
    List(ListValue),
    Map(FieldsValue),
    Object(FieldsValue),
    Field(FieldValue),
    Function(FunctionValue),
    FunctionArgument(FunctionArgumentValue),
}

/// Declared type of a scalar. Decoding maps the empty string to `string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarUnderlyingType {
    #[default]
    String,
    Integer,
    Float,
    Boolean,
}

impl ScalarUnderlyingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarUnderlyingType::String => "string",
            ScalarUnderlyingType::Integer => "integer",
            ScalarUnderlyingType::Float => "float",
            ScalarUnderlyingType::Boolean => "boolean",
        }
    }
}

impl<'de> Deserialize<'de> for ScalarUnderlyingType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        const VARIANTS: &[&str] = &["string", "integer", "float", "boolean"];
        let raw = std::borrow::Cow::<str>::deserialize(deserializer)?;
        match raw.as_ref() {
            "" | "string" => Ok(ScalarUnderlyingType::String),
            "integer" => Ok(ScalarUnderlyingType::Integer),
            "float" => Ok(ScalarUnderlyingType::Float),
            "boolean" => Ok(ScalarUnderlyingType::Boolean),
            other => Err(serde::de::Error::unknown_variant(other, VARIANTS)),
        }
    }
}

/// A JSON-serialized primitive together with its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarValue {
    pub serialized_value: String,
    pub underlying_type: ScalarUnderlyingType,
}

/// Reference to a named output of a resource in a project environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputValue {
    pub project_id: String,
    pub environment_id: String,
    pub resource_id: String,
    pub output_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationValue {
    pub value_name: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListValue {
    pub values: Vec<Value>,
}

/// Ordered field list shared by map and object values. Every element is
/// expected to be a field value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldsValue {
    pub fields: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    pub name: String,
    pub value: Box<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionValue {
    pub function_name: String,
    pub provider_id: String,
    pub argument_values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionArgumentValue {
    pub name: String,
    pub value: Box<Value>,
}

impl Value {
    /// Create a non-secret value of the given kind.
    pub fn new(kind: ValueKind) -> Self {
        Self { is_secret: false, kind }
    }

    /// Create a scalar from an already JSON-serialized primitive.
    pub fn scalar(serialized_value: impl Into<String>, underlying_type: ScalarUnderlyingType) -> Self {
        Self::new(ValueKind::Scalar(ScalarValue { serialized_value: serialized_value.into(), underlying_type }))
    }

    pub fn string(value: impl AsRef<str>) -> Self {
        let serialized = serde_json::Value::String(value.as_ref().to_string()).to_string();
        Self::scalar(serialized, ScalarUnderlyingType::String)
    }

    pub fn integer(value: i64) -> Self {
        Self::scalar(value.to_string(), ScalarUnderlyingType::Integer)
    }

    /// Create a float scalar. Non-finite numbers serialize as JSON `null`.
    pub fn float(value: f64) -> Self {
        Self::scalar(serde_json::Value::from(value).to_string(), ScalarUnderlyingType::Float)
    }

    pub fn boolean(value: bool) -> Self {
        Self::scalar(value.to_string(), ScalarUnderlyingType::Boolean)
    }

    pub fn output(
        project_id: impl Into<String>,
        environment_id: impl Into<String>,
        resource_id: impl Into<String>,
        output_name: impl Into<String>,
    ) -> Self {
        Self::new(ValueKind::Output(OutputValue {
            project_id: project_id.into(),
            environment_id: environment_id.into(),
            resource_id: resource_id.into(),
            output_name: output_name.into(),
        }))
    }

    pub fn configuration(value_name: impl Into<String>) -> Self {
        Self::new(ValueKind::Configuration(ConfigurationValue { value_name: value_name.into() }))
    }

    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Self::new(ValueKind::List(ListValue { values: values.into_iter().collect() }))
    }

    /// Create an object from `(name, value)` pairs, preserving their order.
    pub fn object<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Self {
        Self::new(ValueKind::Object(FieldsValue { fields: Self::fields_from(fields) }))
    }

    /// Create a map from `(key, value)` pairs, preserving their order.
    pub fn map<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Self {
        Self::new(ValueKind::Map(FieldsValue { fields: Self::fields_from(fields) }))
    }

    pub fn field(name: impl Into<String>, value: Value) -> Self {
        Self::new(ValueKind::Field(FieldValue { name: name.into(), value: Box::new(value) }))
    }

    /// Create a function call against `provider_id` with named arguments in declaration order.
    pub fn function<N: Into<String>>(
        provider_id: impl Into<String>,
        function_name: impl Into<String>,
        arguments: impl IntoIterator<Item = (N, Value)>,
    ) -> Self {
        let argument_values = arguments
            .into_iter()
            .map(|(name, value)| Self::function_argument(name, value))
            .collect();
        Self::new(ValueKind::Function(FunctionValue {
            function_name: function_name.into(),
            provider_id: provider_id.into(),
            argument_values,
        }))
    }

    pub fn function_argument(name: impl Into<String>, value: Value) -> Self {
        Self::new(ValueKind::FunctionArgument(FunctionArgumentValue { name: name.into(), value: Box::new(value) }))
    }

    /// Mark this value as secret.
    pub fn secret(mut self) -> Self {
        self.is_secret = true;
        self
    }

    /// The wire name of this value's kind.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            ValueKind::Scalar(_) => "scalar",
            ValueKind::Output(_) => "output",
            ValueKind::Configuration(_) => "configuration",
            ValueKind::List(_) => "list",
            ValueKind::Map(_) => "map",
            ValueKind::Object(_) => "object",
            ValueKind::Field(_) => "field",
            ValueKind::Function(_) => "function",
            ValueKind::FunctionArgument(_) => "functionArgument",
        }
    }

    fn fields_from<N: Into<String>>(fields: impl IntoIterator<Item = (N, Value)>) -> Vec<Value> {
        fields.into_iter().map(|(name, value)| Self::field(name, value)).collect()
    }
}

/// A named value handed to a resource or function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub value: Value,
}

impl Input {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self { name: name.into(), value }
    }

    /// Materialize the value into plain JSON. Fails when the value still
    /// contains references.
    pub fn to_resolved(&self) -> Result<ResolvedInput, crate::MaterializeError> {
        Ok(ResolvedInput { name: self.name.clone(), resolved_value: self.value.to_json()? })
    }
}

/// A named value produced by a resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    pub name: String,
    pub value: Value,
}

impl Output {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self { name: name.into(), value }
    }
}

/// An input whose value has been reduced to plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedInput {
    pub name: String,
    pub resolved_value: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_encoding_matches_wire_format() {
        let value = Value::object([("a", Value::string("hello world"))]);
        let encoded = serde_json::to_string(&value).expect("encode");
        assert_eq!(
            encoded,
            r#"{"kind":"object","fields":[{"kind":"field","name":"a","value":{"kind":"scalar","serializedValue":"\"hello world\"","underlyingType":"string"}}]}"#
        );
    }

    #[test]
    fn secret_flag_is_only_written_when_set() {
        let encoded = serde_json::to_string(&Value::integer(3).secret()).expect("encode");
        assert_eq!(encoded, r#"{"isSecret":true,"kind":"scalar","serializedValue":"3","underlyingType":"integer"}"#);

        let decoded: Value = serde_json::from_str(&encoded).expect("decode");
        assert!(decoded.is_secret);
        assert_eq!(decoded.kind_name(), "scalar");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result = serde_json::from_str::<Value>(r#"{"kind":"mystery"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn nested_function_call_survives_decoding() {
        let value = Value::function(
            "provider-1",
            "concat",
            [("left", Value::output("p", "e", "r", "url")), ("right", Value::configuration("suffix").secret())],
        );
        let encoded = serde_json::to_string(&value).expect("encode");
        let decoded: Value = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, value);

        let ValueKind::Function(function) = &decoded.kind else {
            panic!("expected function, got {}", decoded.kind_name());
        };
        let names: Vec<&str> = function
            .argument_values
            .iter()
            .filter_map(|argument| match &argument.kind {
                ValueKind::FunctionArgument(argument) => Some(argument.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, ["left", "right"]);
    }

    #[test]
    fn members_of_other_kinds_are_rejected() {
        let stray = r#"{"kind":"scalar","serializedValue":"1","underlyingType":"integer","valueName":"oops"}"#;
        let error = serde_json::from_str::<Value>(stray).expect_err("valueName is not a scalar member");
        assert!(error.to_string().contains("valueName"), "{error}");

        let unknown = r#"{"kind":"configuration","valueName":"region","extra":true}"#;
        assert!(serde_json::from_str::<Value>(unknown).is_err());

        let nested = r#"{"kind":"list","values":[{"kind":"output","projectId":"p","environmentId":"e","resourceId":"r","outputName":"o","fields":[]}]}"#;
        assert!(serde_json::from_str::<Value>(nested).is_err());
    }

    #[test]
    fn empty_underlying_type_decodes_as_string() {
        let decoded: Value =
            serde_json::from_str(r#"{"kind":"scalar","serializedValue":"\"x\"","underlyingType":""}"#).expect("decode");
        assert_eq!(decoded, Value::string("x"));
        assert!(serde_json::from_str::<Value>(r#"{"kind":"scalar","serializedValue":"1","underlyingType":"decimal"}"#).is_err());
    }

    #[test]
    fn output_and_function_encoding_lists_every_member() {
        let output = serde_json::to_value(Value::output("p", "e", "r", "url")).expect("encode");
        assert_eq!(
            output,
            serde_json::json!({"kind": "output", "projectId": "p", "environmentId": "e", "resourceId": "r", "outputName": "url"})
        );

        let function = serde_json::to_value(Value::function("pr", "concat", Vec::<(String, Value)>::new())).expect("encode");
        assert_eq!(
            function,
            serde_json::json!({"kind": "function", "functionName": "concat", "providerId": "pr", "argumentValues": []})
        );
    }

    #[test]
    fn missing_underlying_type_defaults_to_string() {
        let decoded: Value = serde_json::from_str(r#"{"kind":"scalar","serializedValue":"\"x\""}"#).expect("decode");
        assert_eq!(
            decoded.kind,
            ValueKind::Scalar(ScalarValue { serialized_value: "\"x\"".to_string(), underlying_type: ScalarUnderlyingType::String })
        );
    }
}
