//! Checking a value tree against the [`Definition`] it is meant to satisfy.

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;

use crate::diff::definition_fits;
use crate::parse::{PathPrefix, child_path};
use crate::{Definition, DefinitionKind, FunctionDefinition, OutputValue, Value, ValueKind};

/// Looks up the definitions of values that are only known by reference.
#[async_trait]
pub trait DefinitionSource: Send + Sync {
    async fn output_definition(&self, reference: &OutputValue) -> anyhow::Result<Definition>;

    async fn configuration_definition(&self, value_name: &str) -> anyhow::Result<Definition>;

    async fn function_definition(&self, provider_id: &str, function_name: &str) -> anyhow::Result<FunctionDefinition>;
}

/// A mismatch between a value and its definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", PathPrefix(.path))]
pub struct ValidationError {
    pub message: String,
    pub path: Vec<String>,
}

/// Failure to walk a value against its definition at all, as opposed to a
/// [`ValidationError`] found along the way.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to look up the definition of {subject}: {source}")]
    Definition {
        subject: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to check whether {subject} changed: {source}")]
    Change {
        subject: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("unable to diff value of kind {kind}")]
    UnsupportedKind { kind: &'static str },
    #[error("function {function_name:?} lists a {kind} definition among its arguments")]
    UnexpectedArgument { function_name: String, kind: &'static str },
}

pub(crate) fn output_subject(reference: &OutputValue) -> String {
    format!("output {:?} of resource {:?}", reference.output_name, reference.resource_id)
}

pub(crate) fn function_subject(provider_id: &str, function_name: &str) -> String {
    format!("function {function_name:?} of provider {provider_id:?}")
}

/// Validate `value` against `definition`.
///
/// `None` stands for an absent value, which is only an error when the
/// definition is required. Output, configuration and function references are
/// checked by comparing their own definitions, looked up through
/// `definitions`, with `definition`. Every mismatch is collected. An error is
/// only returned when a lookup fails.
pub async fn validate_value(
    value: Option<&Value>,
    definition: &Definition,
    definitions: &dyn DefinitionSource,
) -> Result<Vec<ValidationError>, SchemaError> {
    validate_at(value, definition, definitions, Vec::new()).await
}

fn validate_at<'a>(
    value: Option<&'a Value>,
    definition: &'a Definition,
    definitions: &'a dyn DefinitionSource,
    path: Vec<String>,
) -> BoxFuture<'a, Result<Vec<ValidationError>, SchemaError>> {
    async move {
        let mut errors = Vec::new();
        if matches!(definition.kind, DefinitionKind::Any) {
            return Ok(Vec::new());
        }
        let Some(value) = value else {
            if definition.is_required {
                errors.push(mismatch("Value is required", &path));
            }
            return Ok(errors);
        };

        match (&value.kind, &definition.kind) {
            (ValueKind::Output(reference), _) => {
                let referenced = definitions
                    .output_definition(reference)
                    .await
                    .map_err(|source| SchemaError::Definition { subject: output_subject(reference), source })?;
                if !definition_fits(definition, &referenced) {
                    errors.push(mismatch("Output value does not match definition", &path));
                }
            }
            (ValueKind::Configuration(configuration), _) => {
                let referenced = definitions.configuration_definition(&configuration.value_name).await.map_err(|source| {
                    SchemaError::Definition { subject: format!("configuration value {:?}", configuration.value_name), source }
                })?;
                if !definition_fits(definition, &referenced) {
                    errors.push(mismatch("Configuration value does not match definition", &path));
                }
            }
            (ValueKind::Function(function), _) => {
                let function_definition = definitions
                    .function_definition(&function.provider_id, &function.function_name)
                    .await
                    .map_err(|source| SchemaError::Definition {
                        subject: function_subject(&function.provider_id, &function.function_name),
                        source,
                    })?;
                if !definition_fits(definition, &function_definition.value) {
                    errors.push(mismatch("Function return value definition does not match definition", &path));
                }
                for argument in &function_definition.arguments {
                    let DefinitionKind::FunctionArgument(declared) = &argument.kind else {
                        continue;
                    };
                    let argument_path = child_path(&path, &declared.name);
                    let supplied = function.argument_values.iter().find_map(|supplied| match &supplied.kind {
                        ValueKind::FunctionArgument(supplied) if supplied.name == declared.name => Some(supplied.value.as_ref()),
                        _ => None,
                    });
                    match supplied {
                        Some(supplied) => {
                            errors.extend(validate_at(Some(supplied), &declared.value, definitions, argument_path).await?);
                        }
                        None if argument.is_required => {
                            errors.push(ValidationError { message: "Function argument is required".to_string(), path: argument_path });
                        }
                        None => {}
                    }
                }
            }
            _ if value.kind_name() != definition.kind_name() => {
                errors.push(mismatch(format!("Expected value of kind {}, but got {}", definition.kind_name(), value.kind_name()), &path));
            }
            (ValueKind::List(list), DefinitionKind::List(element)) => {
                for (index, item) in list.values.iter().enumerate() {
                    errors.extend(validate_at(Some(item), &element.value, definitions, child_path(&path, index.to_string())).await?);
                }
            }
            (ValueKind::Object(fields), DefinitionKind::Object(object)) => {
                for declared in &object.fields {
                    let DefinitionKind::Field(field) = &declared.kind else {
                        continue;
                    };
                    let field_path = child_path(&path, &field.name);
                    match field_value(&fields.fields, &field.name) {
                        Some(supplied) => errors.extend(validate_at(Some(supplied), &field.value, definitions, field_path).await?),
                        None if declared.is_required && !matches!(field.value.kind, DefinitionKind::Any) => {
                            errors.push(ValidationError { message: "Value is required".to_string(), path: field_path });
                        }
                        None => errors.extend(validate_at(None, &field.value, definitions, field_path).await?),
                    }
                }
                for name in field_names(&fields.fields) {
                    let declared = object.fields.iter().any(|declared| matches!(&declared.kind, DefinitionKind::Field(field) if field.name == name));
                    if !declared {
                        errors.push(ValidationError { message: format!("Unexpected field {name}"), path: child_path(&path, name) });
                    }
                }
            }
            (ValueKind::Map(fields), DefinitionKind::Map(element)) => {
                for field in &fields.fields {
                    if let ValueKind::Field(field) = &field.kind {
                        errors.extend(validate_at(Some(&field.value), &element.value, definitions, child_path(&path, &field.name)).await?);
                    }
                }
            }
            (ValueKind::Scalar(scalar), DefinitionKind::Scalar(expected)) => {
                if scalar.underlying_type != expected.expected_underlying_type {
                    errors.push(mismatch(
                        format!(
                            "Expected scalar value to be {}, but received {}",
                            expected.expected_underlying_type.as_str(),
                            scalar.underlying_type.as_str()
                        ),
                        &path,
                    ));
                }
            }
            _ => {}
        }
        Ok(errors)
    }
    .boxed()
}

fn mismatch(message: impl Into<String>, path: &[String]) -> ValidationError {
    ValidationError { message: message.into(), path: path.to_vec() }
}

/// The value of the field called `name`, if any.
pub(crate) fn field_value<'v>(fields: &'v [Value], name: &str) -> Option<&'v Value> {
    fields.iter().find_map(|field| match &field.kind {
        ValueKind::Field(field) if field.name == name => Some(field.value.as_ref()),
        _ => None,
    })
}

pub(crate) fn field_names(fields: &[Value]) -> impl Iterator<Item = &str> {
    fields.iter().filter_map(|field| match &field.kind {
        ValueKind::Field(field) => Some(field.name.as_str()),
        _ => None,
    })
}
