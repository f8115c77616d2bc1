//! Structural checks of raw JSON before it is decoded into a [`Value`].
//!
//! Unlike plain decoding, which stops at the first problem, every problem in
//! the tree is reported together with the path of the node it was found at.
//! Scalars are also checked for a serialized value that matches their
//! declared type.

use std::fmt;

use serde_json::{Map, Value as Json};
use thiserror::Error;

use crate::{ScalarUnderlyingType, Value};

/// A problem found while parsing, tagged with the path of the offending node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", PathPrefix(.path))]
pub struct ParseError {
    pub message: String,
    pub path: Vec<String>,
}

/// Renders `a.b.c: ` ahead of a message, or nothing for the root.
pub(crate) struct PathPrefix<'a>(pub(crate) &'a [String]);

impl fmt::Display for PathPrefix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, "{}: ", self.0.join("."))
    }
}

pub(crate) fn child_path(path: &[String], segment: impl Into<String>) -> Vec<String> {
    let mut child = path.to_vec();
    child.push(segment.into());
    child
}

/// Check `raw` and decode it.
///
/// Returns every problem found anywhere in the tree, or the decoded value
/// when there are none.
pub fn parse_value(raw: &Json) -> Result<Value, Vec<ParseError>> {
    let mut parser = Parser::default();
    parser.check_value(raw, &[]);
    if !parser.errors.is_empty() {
        return Err(parser.errors);
    }
    serde_json::from_value(raw.clone()).map_err(|error| vec![ParseError { message: error.to_string(), path: Vec::new() }])
}

#[derive(Default)]
struct Parser {
    errors: Vec<ParseError>,
}

impl Parser {
    fn push(&mut self, message: impl Into<String>, path: &[String]) {
        self.errors.push(ParseError { message: message.into(), path: path.to_vec() });
    }

    fn check_value(&mut self, raw: &Json, path: &[String]) {
        let Some(object) = raw.as_object() else {
            self.push(format!("Expected an object, got {}", json_type(raw)), path);
            return;
        };
        let Some(kind) = object.get("kind").and_then(Json::as_str) else {
            self.push(r#"Expected an object with a "kind" string property"#, path);
            return;
        };
        let Some(members) = members_of(kind) else {
            self.push(format!("Unknown kind {kind}"), path);
            return;
        };

        if object.get("isSecret").is_some_and(|flag| !flag.is_boolean()) {
            self.push("Expected isSecret to be a boolean", path);
        }
        for key in object.keys() {
            if key != "kind" && key != "isSecret" && !members.contains(&key.as_str()) {
                self.push(format!("Unexpected property {key} on {kind} value"), path);
            }
        }

        match kind {
            "scalar" => self.check_scalar(object, path),
            "output" => {
                for member in ["projectId", "environmentId", "resourceId", "outputName"] {
                    self.expect_string(object, member, path);
                }
            }
            "configuration" => {
                self.expect_string(object, "valueName", path);
            }
            "list" => {
                if let Some(values) = self.expect_array(object, "values", path) {
                    for (index, element) in values.iter().enumerate() {
                        self.check_value(element, &child_path(path, format!("values[{index}]")));
                    }
                }
            }
            "map" | "object" => {
                if let Some(fields) = self.expect_array(object, "fields", path) {
                    for (index, field) in fields.iter().enumerate() {
                        self.check_member(field, "field", &child_path(path, format!("fields[{index}]")));
                    }
                }
            }
            "field" | "functionArgument" => self.check_named(object, kind, path),
            "function" => self.check_function(object, path),
            _ => {}
        }
    }

    /// Check a node that must be of `expected` kind, such as an object field.
    fn check_member(&mut self, raw: &Json, expected: &str, path: &[String]) {
        match raw.get("kind").and_then(Json::as_str) {
            Some(kind) if kind != expected => self.push(format!("Expected a {expected} value, got {kind}"), path),
            _ => self.check_value(raw, path),
        }
    }

    fn check_named(&mut self, object: &Map<String, Json>, kind: &str, path: &[String]) {
        let Some(name) = object.get("name").and_then(Json::as_str) else {
            let noun = if kind == "field" { "field" } else { "argument" };
            self.push(format!("Expected {noun} name to be a string"), path);
            return;
        };
        self.check_value(object.get("value").unwrap_or(&Json::Null), &child_path(path, name));
    }

    fn check_function(&mut self, object: &Map<String, Json>, path: &[String]) {
        let Some(function_name) = object.get("functionName").and_then(Json::as_str) else {
            self.push("Expected function name to be a string", path);
            return;
        };
        if object.contains_key("providerId") {
            self.expect_string(object, "providerId", path);
        }
        let Some(arguments) = self.expect_array(object, "argumentValues", path) else {
            return;
        };
        let argument_path = child_path(path, function_name);
        for argument in arguments {
            self.check_member(argument, "functionArgument", &argument_path);
        }
    }

    fn check_scalar(&mut self, object: &Map<String, Json>, path: &[String]) {
        let Some(serialized) = object.get("serializedValue").and_then(Json::as_str) else {
            self.push("Expected serializedValue to be a string", path);
            return;
        };
        let declared = match object.get("underlyingType") {
            None => ScalarUnderlyingType::String,
            Some(Json::String(name)) => match underlying_type(name) {
                Some(declared) => declared,
                None => {
                    self.push(format!("Unknown underlyingType {name}"), path);
                    return;
                }
            },
            Some(_) => {
                self.push("Expected underlyingType to be a string", path);
                return;
            }
        };

        let parsed = match serde_json::from_str::<Json>(serialized) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.push(format!("Serialized value is not valid JSON: {error}"), path);
                return;
            }
        };
        let actual = match &parsed {
            Json::Number(number) if number.is_i64() || number.is_u64() => ScalarUnderlyingType::Integer,
            Json::Number(number) if number.as_f64().is_some_and(|float| float.fract() == 0.0) => ScalarUnderlyingType::Integer,
            Json::Number(_) => ScalarUnderlyingType::Float,
            Json::Bool(_) => ScalarUnderlyingType::Boolean,
            Json::String(_) => ScalarUnderlyingType::String,
            other => {
                self.push(format!("Unsupported underlying scalar type {}", json_type(other)), path);
                return;
            }
        };

        let fits = declared == actual || (declared == ScalarUnderlyingType::Float && actual == ScalarUnderlyingType::Integer);
        if !fits {
            self.push(
                format!("Expected underlyingType ({}) to match type of serialized value ({})", declared.as_str(), actual.as_str()),
                path,
            );
        }
    }

    fn expect_string(&mut self, object: &Map<String, Json>, member: &str, path: &[String]) {
        if !object.get(member).is_some_and(Json::is_string) {
            self.push(format!("Expected {member} to be a string"), path);
        }
    }

    fn expect_array<'j>(&mut self, object: &'j Map<String, Json>, member: &str, path: &[String]) -> Option<&'j Vec<Json>> {
        let array = object.get(member).and_then(Json::as_array);
        if array.is_none() {
            self.push(format!("Expected {member} to be an array"), path);
        }
        array
    }
}

fn members_of(kind: &str) -> Option<&'static [&'static str]> {
    let members: &'static [&'static str] = match kind {
        "scalar" => &["serializedValue", "underlyingType"],
        "output" => &["projectId", "environmentId", "resourceId", "outputName"],
        "configuration" => &["valueName"],
        "list" => &["values"],
        "map" | "object" => &["fields"],
        "field" | "functionArgument" => &["name", "value"],
        "function" => &["functionName", "providerId", "argumentValues"],
        _ => return None,
    };
    Some(members)
}

fn underlying_type(name: &str) -> Option<ScalarUnderlyingType> {
    match name {
        "" | "string" => Some(ScalarUnderlyingType::String),
        "integer" => Some(ScalarUnderlyingType::Integer),
        "float" => Some(ScalarUnderlyingType::Float),
        "boolean" => Some(ScalarUnderlyingType::Boolean),
        _ => None,
    }
}

fn json_type(raw: &Json) -> &'static str {
    match raw {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
