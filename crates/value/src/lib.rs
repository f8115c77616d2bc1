//! Value AST and resolution engine for Anzu providers.
//!
//! This crate defines the tagged expression tree exchanged between the host and
//! provider binaries, its kind-tagged JSON encoding, the schema counterpart
//! ([`Definition`]) and the resolution engine that reduces output,
//! configuration and function references to concrete values. Values can also
//! be checked against definitions and compared with earlier revisions.

mod ast;
mod definition;
mod dependencies;
mod diff;
mod encoding;
mod materialize;
mod parse;
mod resolve;
mod validate;
mod wire;

pub use ast::{
    ConfigurationValue, FieldValue, FieldsValue, FunctionArgumentValue, FunctionValue, Input, ListValue, Output, OutputValue,
    ResolvedInput, ScalarUnderlyingType, ScalarValue, Value, ValueKind,
};
pub use definition::{
    Definition, DefinitionKind, FieldDefinition, FunctionArgumentDefinition, FunctionDefinition, InputDefinition, ListDefinition,
    MapDefinition, ObjectDefinition, OutputDefinition, ResourceOptions, ScalarDefinition, SignatureError, ValueRenderingOptions,
};
pub use dependencies::output_dependencies;
pub use diff::{ConfigurationChange, OutputChange, ReferenceChanges, ValueChange, ValueChangeReason, definition_fits, diff_value};
pub use encoding::{EncodingError, decode, encode};
pub use materialize::MaterializeError;
pub use parse::{ParseError, parse_value};
pub use resolve::{
    ConfigurationResolver, FnConfigurationResolver, FnFunctionResolver, FnOutputResolver, FunctionCall, FunctionResolver,
    OutputResolver, ResolveError, Resolvers, configuration_resolver_fn, function_resolver_fn, output_resolver_fn, resolve_inputs,
    resolve_value,
};
pub use validate::{DefinitionSource, SchemaError, ValidationError, validate_value};
