//! Recursive reduction of value trees.
//!
//! Output, configuration and function references are replaced by what the
//! caller-supplied resolvers return. Everything else is rebuilt with resolved
//! children, preserving order and names.

use std::future::Future;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;

use crate::{FieldValue, FieldsValue, Input, ListValue, OutputValue, Value, ValueKind};

/// Resolves a reference to another resource's output.
#[async_trait]
pub trait OutputResolver: Send + Sync {
    async fn resolve_output(&self, reference: &OutputValue) -> anyhow::Result<Value>;
}

/// Resolves a named provider configuration value.
#[async_trait]
pub trait ConfigurationResolver: Send + Sync {
    async fn resolve_configuration(&self, value_name: &str) -> anyhow::Result<Value>;
}

/// Evaluates a function call whose arguments have already been resolved.
#[async_trait]
pub trait FunctionResolver: Send + Sync {
    async fn resolve_function(&self, call: FunctionCall) -> anyhow::Result<Value>;
}

/// A function invocation with fully resolved arguments in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub provider_id: String,
    pub function_name: String,
    pub arguments: Vec<Input>,
}

/// Adapter turning a closure into an [`OutputResolver`].
pub struct FnOutputResolver<F>(F);

pub fn output_resolver_fn<F>(resolve: F) -> FnOutputResolver<F>
where
    F: Fn(&OutputValue) -> anyhow::Result<Value> + Send + Sync,
{
    FnOutputResolver(resolve)
}

#[async_trait]
impl<F> OutputResolver for FnOutputResolver<F>
where
    F: Fn(&OutputValue) -> anyhow::Result<Value> + Send + Sync,
{
    async fn resolve_output(&self, reference: &OutputValue) -> anyhow::Result<Value> {
        (self.0)(reference)
    }
}

/// Adapter turning a closure into a [`ConfigurationResolver`].
pub struct FnConfigurationResolver<F>(F);

pub fn configuration_resolver_fn<F>(resolve: F) -> FnConfigurationResolver<F>
where
    F: Fn(&str) -> anyhow::Result<Value> + Send + Sync,
{
    FnConfigurationResolver(resolve)
}

#[async_trait]
impl<F> ConfigurationResolver for FnConfigurationResolver<F>
where
    F: Fn(&str) -> anyhow::Result<Value> + Send + Sync,
{
    async fn resolve_configuration(&self, value_name: &str) -> anyhow::Result<Value> {
        (self.0)(value_name)
    }
}

/// Adapter turning an async closure into a [`FunctionResolver`].
pub struct FnFunctionResolver<F>(F);

pub fn function_resolver_fn<F, Fut>(resolve: F) -> FnFunctionResolver<F>
where
    F: Fn(FunctionCall) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    FnFunctionResolver(resolve)
}

#[async_trait]
impl<F, Fut> FunctionResolver for FnFunctionResolver<F>
where
    F: Fn(FunctionCall) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn resolve_function(&self, call: FunctionCall) -> anyhow::Result<Value> {
        (self.0)(call).await
    }
}

/// The resolvers available for one resolution pass. Any of them may be absent;
/// encountering a reference without its resolver is an error.
#[derive(Clone, Copy, Default)]
pub struct Resolvers<'a> {
    pub output: Option<&'a dyn OutputResolver>,
    pub configuration: Option<&'a dyn ConfigurationResolver>,
    pub function: Option<&'a dyn FunctionResolver>,
}

impl<'a> Resolvers<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, resolver: &'a dyn OutputResolver) -> Self {
        self.output = Some(resolver);
        self
    }

    pub fn with_configuration(mut self, resolver: &'a dyn ConfigurationResolver) -> Self {
        self.configuration = Some(resolver);
        self
    }

    pub fn with_function(mut self, resolver: &'a dyn FunctionResolver) -> Self {
        self.function = Some(resolver);
        self
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{kind} value found but no {kind} resolver provided")]
    MissingResolver { kind: &'static str },
    #[error("failed to resolve output {output_name:?} of resource {resource_id:?}: {source}")]
    Output {
        resource_id: String,
        output_name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to resolve configuration value {name:?}: {source}")]
    Configuration {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to resolve function {function_name:?} of provider {provider_id:?}: {source}")]
    Function {
        provider_id: String,
        function_name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("unable to resolve list value at index {index}: {source}")]
    ListElement {
        index: usize,
        #[source]
        source: Box<ResolveError>,
    },
    #[error("unable to resolve field {name:?}: {source}")]
    Field {
        name: String,
        #[source]
        source: Box<ResolveError>,
    },
    #[error("unable to resolve function argument {name:?}: {source}")]
    FunctionArgument {
        name: String,
        #[source]
        source: Box<ResolveError>,
    },
    #[error("unable to resolve input {name:?}: {source}")]
    Input {
        name: String,
        #[source]
        source: Box<ResolveError>,
    },
    #[error("expected {expected} value inside {container}, found {found}")]
    UnexpectedKind {
        container: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("unable to resolve value of kind {kind}")]
    UnsupportedKind { kind: &'static str },
}

/// Reduce `value` to a tree free of output, configuration and function
/// references.
///
/// Children are resolved sequentially in declaration order. A reference
/// marked secret keeps its secret flag on the replacement value.
pub fn resolve_value<'a>(value: Value, resolvers: Resolvers<'a>) -> BoxFuture<'a, Result<Value, ResolveError>> {
    async move {
        let is_secret = value.is_secret;
        match value.kind {
            ValueKind::Scalar(scalar) => Ok(Value { is_secret, kind: ValueKind::Scalar(scalar) }),
            ValueKind::Output(reference) => {
                let resolver = resolvers.output.ok_or(ResolveError::MissingResolver { kind: "output" })?;
                let resolved = resolver.resolve_output(&reference).await.map_err(|source| ResolveError::Output {
                    resource_id: reference.resource_id.clone(),
                    output_name: reference.output_name.clone(),
                    source,
                })?;
                Ok(inherit_secret(resolved, is_secret))
            }
            ValueKind::Configuration(configuration) => {
                let resolver = resolvers.configuration.ok_or(ResolveError::MissingResolver { kind: "configuration" })?;
                let resolved = resolver
                    .resolve_configuration(&configuration.value_name)
                    .await
                    .map_err(|source| ResolveError::Configuration { name: configuration.value_name.clone(), source })?;
                Ok(inherit_secret(resolved, is_secret))
            }
            ValueKind::List(list) => {
                let mut values = Vec::with_capacity(list.values.len());
                for (index, element) in list.values.into_iter().enumerate() {
                    let resolved = resolve_value(element, resolvers)
                        .await
                        .map_err(|source| ResolveError::ListElement { index, source: Box::new(source) })?;
                    values.push(resolved);
                }
                Ok(Value { is_secret, kind: ValueKind::List(ListValue { values }) })
            }
            ValueKind::Map(fields) => {
                let fields = resolve_fields("map", fields, resolvers).await?;
                Ok(Value { is_secret, kind: ValueKind::Map(fields) })
            }
            ValueKind::Object(fields) => {
                let fields = resolve_fields("object", fields, resolvers).await?;
                Ok(Value { is_secret, kind: ValueKind::Object(fields) })
            }
            ValueKind::Function(function) => {
                let resolver = resolvers.function.ok_or(ResolveError::MissingResolver { kind: "function" })?;
                let mut arguments = Vec::with_capacity(function.argument_values.len());
                for argument in function.argument_values {
                    let found = argument.kind_name();
                    let ValueKind::FunctionArgument(argument) = argument.kind else {
                        return Err(ResolveError::UnexpectedKind { container: "function", expected: "functionArgument", found });
                    };
                    let resolved = resolve_value(*argument.value, resolvers)
                        .await
                        .map_err(|source| ResolveError::FunctionArgument { name: argument.name.clone(), source: Box::new(source) })?;
                    arguments.push(Input { name: argument.name, value: resolved });
                }
                tracing::debug!(provider = %function.provider_id, function = %function.function_name, "invoking function resolver");
                let call = FunctionCall {
                    provider_id: function.provider_id.clone(),
                    function_name: function.function_name.clone(),
                    arguments,
                };
                let resolved = resolver.resolve_function(call).await.map_err(|source| ResolveError::Function {
                    provider_id: function.provider_id,
                    function_name: function.function_name,
                    source,
                })?;
                Ok(inherit_secret(resolved, is_secret))
            }
            ValueKind::Field(_) => Err(ResolveError::UnsupportedKind { kind: "field" }),
            ValueKind::FunctionArgument(_) => Err(ResolveError::UnsupportedKind { kind: "functionArgument" }),
        }
    }
    .boxed()
}

/// Resolve every input value, keeping names and order.
pub async fn resolve_inputs(inputs: Vec<Input>, resolvers: Resolvers<'_>) -> Result<Vec<Input>, ResolveError> {
    let mut resolved = Vec::with_capacity(inputs.len());
    for input in inputs {
        let value = resolve_value(input.value, resolvers)
            .await
            .map_err(|source| ResolveError::Input { name: input.name.clone(), source: Box::new(source) })?;
        resolved.push(Input { name: input.name, value });
    }
    Ok(resolved)
}

async fn resolve_fields(container: &'static str, fields: FieldsValue, resolvers: Resolvers<'_>) -> Result<FieldsValue, ResolveError> {
    let mut resolved = Vec::with_capacity(fields.fields.len());
    for field in fields.fields {
        let is_secret = field.is_secret;
        let found = field.kind_name();
        let ValueKind::Field(field) = field.kind else {
            return Err(ResolveError::UnexpectedKind { container, expected: "field", found });
        };
        let value = resolve_value(*field.value, resolvers)
            .await
            .map_err(|source| ResolveError::Field { name: field.name.clone(), source: Box::new(source) })?;
        resolved.push(Value { is_secret, kind: ValueKind::Field(FieldValue { name: field.name, value: Box::new(value) }) });
    }
    Ok(FieldsValue { fields: resolved })
}

fn inherit_secret(mut resolved: Value, is_secret: bool) -> Value {
    resolved.is_secret |= is_secret;
    resolved
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;

    use super::*;

    #[tokio::test]
    async fn scalars_pass_through_without_resolvers() {
        let value = Value::list([Value::string("a"), Value::integer(1).secret()]);
        let resolved = resolve_value(value.clone(), Resolvers::new()).await.expect("resolved");
        assert_eq!(resolved, value);
    }

    #[tokio::test]
    async fn output_reference_without_resolver_fails() {
        let value = Value::object([("url", Value::output("p", "e", "db", "url"))]);
        let err = resolve_value(value, Resolvers::new()).await.unwrap_err();
        let ResolveError::Field { name, source } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(name, "url");
        assert!(matches!(*source, ResolveError::MissingResolver { kind: "output" }));
        assert!(source.to_string().contains("output value found but no output resolver provided"));
    }

    #[tokio::test]
    async fn function_arguments_resolve_before_the_call() {
        let calls = Arc::new(Mutex::new(Vec::<String>::new()));

        let output_calls = calls.clone();
        let outputs = output_resolver_fn(move |reference: &OutputValue| {
            output_calls.lock().unwrap().push(format!("output:{}", reference.output_name));
            Ok(Value::string("db.internal"))
        });
        let function_calls = calls.clone();
        let functions = function_resolver_fn(move |call: FunctionCall| {
            function_calls.lock().unwrap().push(format!("function:{}", call.function_name));
            async move {
                let host = call.arguments[0].value.to_json()?;
                Ok::<_, anyhow::Error>(Value::string(format!("postgres://{}", host.as_str().unwrap_or_default())))
            }
        });

        let value = Value::function("fn", "connection_string", [("host", Value::output("p", "e", "db", "host"))]);
        let resolved = resolve_value(value, Resolvers::new().with_output(&outputs).with_function(&functions)).await.expect("resolved");

        assert_eq!(resolved, Value::string("postgres://db.internal"));
        assert_eq!(*calls.lock().unwrap(), ["output:host", "function:connection_string"]);
    }

    #[tokio::test]
    async fn list_and_object_order_is_preserved() {
        let configuration = configuration_resolver_fn(|name: &str| Ok(Value::string(name.to_uppercase())));
        let value = Value::object([
            ("z", Value::configuration("zone")),
            ("a", Value::list([Value::configuration("one"), Value::integer(2), Value::configuration("three")])),
        ]);
        let resolved = resolve_value(value, Resolvers::new().with_configuration(&configuration)).await.expect("resolved");
        assert_eq!(
            resolved,
            Value::object([
                ("z", Value::string("ZONE")),
                ("a", Value::list([Value::string("ONE"), Value::integer(2), Value::string("THREE")])),
            ])
        );
    }

    #[tokio::test]
    async fn secret_reference_marks_resolved_value_secret() {
        let configuration = configuration_resolver_fn(|_: &str| Ok(Value::string("hunter2")));
        let resolved =
            resolve_value(Value::configuration("password").secret(), Resolvers::new().with_configuration(&configuration)).await.expect("resolved");
        assert!(resolved.is_secret);
    }

    #[tokio::test]
    async fn resolver_failure_is_wrapped_with_context() {
        let outputs = output_resolver_fn(|_: &OutputValue| Err(anyhow!("resource not deployed")));
        let err = resolve_value(Value::list([Value::output("p", "e", "db", "url")]), Resolvers::new().with_output(&outputs))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("index 0"), "{message}");
        assert!(message.contains("resource not deployed"), "{message}");
    }

    #[tokio::test]
    async fn non_field_inside_object_is_rejected() {
        let value = Value::new(ValueKind::Object(FieldsValue { fields: vec![Value::string("loose")] }));
        let err = resolve_value(value, Resolvers::new()).await.unwrap_err();
        assert!(matches!(err, ResolveError::UnexpectedKind { expected: "field", found: "scalar", .. }));
    }

    #[tokio::test]
    async fn bare_field_is_not_resolvable() {
        let err = resolve_value(Value::field("a", Value::integer(1)), Resolvers::new()).await.unwrap_err();
        assert!(matches!(err, ResolveError::UnsupportedKind { kind: "field" }));
    }
}
