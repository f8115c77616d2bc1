//! Definition compatibility and change detection between two value trees.

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};

use crate::parse::child_path;
use crate::validate::{DefinitionSource, SchemaError, field_names, field_value, function_subject, output_subject};
use crate::{
    Definition, DefinitionKind, FieldDefinition, FieldsValue, FunctionDefinition, FunctionValue, ListValue, OutputValue, Value, ValueKind,
};

/// Definition used below containers whose own definition does not describe
/// their children.
static ANY: Definition = Definition::new(DefinitionKind::Any);

/// Whether a value described by `candidate` can stand in where `expected` is
/// declared.
///
/// An `any` definition on either side fits everything. Otherwise kinds must
/// match, a required `expected` needs a required `candidate`, list and map
/// elements must fit, object fields must agree in both directions and scalars
/// must share their underlying type.
pub fn definition_fits(expected: &Definition, candidate: &Definition) -> bool {
    if matches!(expected.kind, DefinitionKind::Any) || matches!(candidate.kind, DefinitionKind::Any) {
        return true;
    }
    if expected.is_required && !candidate.is_required {
        return false;
    }
    match (&expected.kind, &candidate.kind) {
        (DefinitionKind::List(expected), DefinitionKind::List(candidate)) => definition_fits(&expected.value, &candidate.value),
        (DefinitionKind::Map(expected), DefinitionKind::Map(candidate)) => definition_fits(&expected.value, &candidate.value),
        (DefinitionKind::Object(expected), DefinitionKind::Object(candidate)) => {
            fields_fit(&expected.fields, &candidate.fields) && fields_fit(&candidate.fields, &expected.fields)
        }
        (DefinitionKind::Scalar(expected), DefinitionKind::Scalar(candidate)) => {
            expected.expected_underlying_type == candidate.expected_underlying_type
        }
        _ => false,
    }
}

/// Every field of `left` has a counterpart in `right` with the same required
/// flag and a fitting definition.
fn fields_fit(left: &[Definition], right: &[Definition]) -> bool {
    field_definitions(left).all(|(wrapper, field)| {
        field_definitions(right).any(|(other_wrapper, other)| {
            other.name == field.name && other_wrapper.is_required == wrapper.is_required && definition_fits(&field.value, &other.value)
        })
    })
}

fn field_definitions(fields: &[Definition]) -> impl Iterator<Item = (&Definition, &FieldDefinition)> {
    fields.iter().filter_map(|wrapper| match &wrapper.kind {
        DefinitionKind::Field(field) => Some((wrapper, field)),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueChangeReason {
    DifferentKind,
    ScalarUnderlyingTypeChanged,
    ScalarSerializedValueChanged,
    ListLengthChanged,
    ListItemChanged,
    ObjectFieldCountChanged,
    ObjectFieldAdded,
    ObjectFieldRemoved,
    ObjectFieldsChanged,
    MapFieldCountChanged,
    MapFieldAdded,
    MapFieldRemoved,
    MapFieldsChanged,
    OutputValueChanged,
    OutputValueDrift,
    ConfigurationValueChanged,
    FunctionChanged,
}

/// A difference between two values at `path`.
///
/// Container changes carry the changes of their children. `should_replace`
/// is set when the definition of the changed node, or of any changed child,
/// asks for the resource to be replaced instead of updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange {
    pub reason: ValueChangeReason,
    pub path: Vec<String>,
    #[serde(default)]
    pub should_replace: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ValueChange>,
}

impl ValueChange {
    fn new(reason: ValueChangeReason, path: Vec<String>, should_replace: bool) -> Self {
        Self { reason, path, should_replace, changes: Vec::new() }
    }

    /// Aggregate child changes, or `None` when there are none.
    fn nested(reason: ValueChangeReason, path: Vec<String>, should_replace: bool, changes: Vec<ValueChange>) -> Option<Self> {
        if changes.is_empty() {
            return None;
        }
        let should_replace = should_replace || changes.iter().any(|change| change.should_replace);
        Some(Self { reason, path, should_replace, changes })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChange {
    /// The deployed resource no longer matches its recorded output.
    Drift,
    Changed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationChange {
    Added,
    Changed,
}

/// Reports whether referenced outputs and configuration values changed since
/// the previous deployment.
#[async_trait]
pub trait ReferenceChanges: Send + Sync {
    async fn output_change(&self, reference: &OutputValue) -> anyhow::Result<Option<OutputChange>>;

    async fn configuration_change(&self, value_name: &str) -> anyhow::Result<Option<ConfigurationChange>>;
}

/// Compare `previous` with `next`, both described by `definition`.
///
/// Returns `None` when nothing changed. References that are identical on both
/// sides still change when `references` reports that their target changed.
pub async fn diff_value(
    previous: &Value,
    next: &Value,
    definition: &Definition,
    references: &dyn ReferenceChanges,
    definitions: &dyn DefinitionSource,
) -> Result<Option<ValueChange>, SchemaError> {
    Differ { references, definitions }.diff(previous, next, definition, Vec::new()).await
}

struct Differ<'a> {
    references: &'a dyn ReferenceChanges,
    definitions: &'a dyn DefinitionSource,
}

impl Differ<'_> {
    fn diff<'s>(
        &'s self,
        previous: &'s Value,
        next: &'s Value,
        definition: &'s Definition,
        path: Vec<String>,
    ) -> BoxFuture<'s, Result<Option<ValueChange>, SchemaError>> {
        async move {
            let should_replace = definition.resource.as_ref().is_some_and(|resource| resource.replace_on_change);
            let changed = |reason: ValueChangeReason| -> Result<Option<ValueChange>, SchemaError> {
                Ok(Some(ValueChange::new(reason, path.clone(), should_replace)))
            };

            match (&previous.kind, &next.kind) {
                _ if previous.kind_name() != next.kind_name() => changed(ValueChangeReason::DifferentKind),
                (ValueKind::Scalar(previous), ValueKind::Scalar(next)) => {
                    if previous.underlying_type != next.underlying_type {
                        changed(ValueChangeReason::ScalarUnderlyingTypeChanged)
                    } else if previous.serialized_value != next.serialized_value {
                        changed(ValueChangeReason::ScalarSerializedValueChanged)
                    } else {
                        Ok(None)
                    }
                }
                (ValueKind::List(previous), ValueKind::List(next)) => self.diff_list(previous, next, definition, path, should_replace).await,
                (ValueKind::Object(previous), ValueKind::Object(next)) => {
                    self.diff_object(previous, next, definition, path, should_replace).await
                }
                (ValueKind::Map(previous), ValueKind::Map(next)) => self.diff_map(previous, next, definition, path, should_replace).await,
                (ValueKind::Output(previous), ValueKind::Output(next)) => {
                    if previous != next {
                        return changed(ValueChangeReason::OutputValueChanged);
                    }
                    let change = self
                        .references
                        .output_change(next)
                        .await
                        .map_err(|source| SchemaError::Change { subject: output_subject(next), source })?;
                    match change {
                        Some(OutputChange::Drift) => changed(ValueChangeReason::OutputValueDrift),
                        Some(OutputChange::Changed) => changed(ValueChangeReason::OutputValueChanged),
                        None => Ok(None),
                    }
                }
                (ValueKind::Configuration(previous), ValueKind::Configuration(next)) => {
                    if previous.value_name != next.value_name {
                        return changed(ValueChangeReason::ConfigurationValueChanged);
                    }
                    let change = self.references.configuration_change(&next.value_name).await.map_err(|source| SchemaError::Change {
                        subject: format!("configuration value {:?}", next.value_name),
                        source,
                    })?;
                    match change {
                        Some(_) => changed(ValueChangeReason::ConfigurationValueChanged),
                        None => Ok(None),
                    }
                }
                (ValueKind::Function(previous), ValueKind::Function(next)) => {
                    self.diff_function(previous, next, path, should_replace).await
                }
                _ => Err(SchemaError::UnsupportedKind { kind: previous.kind_name() }),
            }
        }
        .boxed()
    }

    async fn diff_list(
        &self,
        previous: &ListValue,
        next: &ListValue,
        definition: &Definition,
        path: Vec<String>,
        should_replace: bool,
    ) -> Result<Option<ValueChange>, SchemaError> {
        if previous.values.len() != next.values.len() {
            return Ok(Some(ValueChange::new(ValueChangeReason::ListLengthChanged, path, should_replace)));
        }
        let element = match &definition.kind {
            DefinitionKind::List(list) => list.value.as_ref(),
            _ => &ANY,
        };

        let mut changes = Vec::new();
        for (index, (previous, next)) in previous.values.iter().zip(&next.values).enumerate() {
            if let Some(change) = self.diff(previous, next, element, child_path(&path, index.to_string())).await? {
                changes.push(change);
            }
        }
        Ok(ValueChange::nested(ValueChangeReason::ListItemChanged, path, should_replace, changes))
    }

    async fn diff_object(
        &self,
        previous: &FieldsValue,
        next: &FieldsValue,
        definition: &Definition,
        path: Vec<String>,
        should_replace: bool,
    ) -> Result<Option<ValueChange>, SchemaError> {
        if previous.fields.len() != next.fields.len() {
            return Ok(Some(ValueChange::new(ValueChangeReason::ObjectFieldCountChanged, path, should_replace)));
        }

        // Without an object definition every field present on either side is
        // compared as `any`.
        let declared: Vec<(&str, bool, &Definition)> = match &definition.kind {
            DefinitionKind::Object(object) => field_definitions(&object.fields)
                .map(|(wrapper, field)| {
                    let replace = wrapper.resource.as_ref().is_some_and(|resource| resource.replace_on_change);
                    (field.name.as_str(), replace, field.value.as_ref())
                })
                .collect(),
            _ => {
                let mut names: Vec<&str> = field_names(&previous.fields).collect();
                for name in field_names(&next.fields) {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
                names.into_iter().map(|name| (name, false, &ANY)).collect()
            }
        };

        let mut changes = Vec::new();
        for (name, replace, field_definition) in declared {
            let field_path = child_path(&path, name);
            match (field_value(&previous.fields, name), field_value(&next.fields, name)) {
                (None, None) => {}
                (None, Some(_)) => changes.push(ValueChange::new(ValueChangeReason::ObjectFieldAdded, field_path, replace)),
                (Some(_), None) => changes.push(ValueChange::new(ValueChangeReason::ObjectFieldRemoved, field_path, replace)),
                (Some(previous), Some(next)) => {
                    if let Some(change) = self.diff(previous, next, field_definition, field_path).await? {
                        changes.push(change);
                    }
                }
            }
        }
        Ok(ValueChange::nested(ValueChangeReason::ObjectFieldsChanged, path, should_replace, changes))
    }

    async fn diff_map(
        &self,
        previous: &FieldsValue,
        next: &FieldsValue,
        definition: &Definition,
        path: Vec<String>,
        should_replace: bool,
    ) -> Result<Option<ValueChange>, SchemaError> {
        if previous.fields.len() != next.fields.len() {
            return Ok(Some(ValueChange::new(ValueChangeReason::MapFieldCountChanged, path, should_replace)));
        }
        let element = match &definition.kind {
            DefinitionKind::Map(map) => map.value.as_ref(),
            _ => &ANY,
        };

        let mut changes = Vec::new();
        for name in field_names(&previous.fields) {
            let field_path = child_path(&path, name);
            let (Some(previous), Some(next)) = (field_value(&previous.fields, name), field_value(&next.fields, name)) else {
                changes.push(ValueChange::new(ValueChangeReason::MapFieldRemoved, field_path, false));
                continue;
            };
            if let Some(change) = self.diff(previous, next, element, field_path).await? {
                changes.push(change);
            }
        }
        for name in field_names(&next.fields) {
            if field_value(&previous.fields, name).is_none() {
                changes.push(ValueChange::new(ValueChangeReason::MapFieldAdded, child_path(&path, name), false));
            }
        }
        Ok(ValueChange::nested(ValueChangeReason::MapFieldsChanged, path, should_replace, changes))
    }

    /// A different call target, or an argument supplied on only one side,
    /// changes the whole call. Otherwise the first changed argument in
    /// declaration order is reported.
    async fn diff_function(
        &self,
        previous: &FunctionValue,
        next: &FunctionValue,
        path: Vec<String>,
        should_replace: bool,
    ) -> Result<Option<ValueChange>, SchemaError> {
        let changed = || -> Result<Option<ValueChange>, SchemaError> {
            Ok(Some(ValueChange::new(ValueChangeReason::FunctionChanged, path.clone(), should_replace)))
        };
        if previous.provider_id != next.provider_id || previous.function_name != next.function_name {
            return changed();
        }

        let definition = self.function_definition(next).await?;
        for argument in &definition.arguments {
            let DefinitionKind::FunctionArgument(declared) = &argument.kind else {
                return Err(SchemaError::UnexpectedArgument { function_name: next.function_name.clone(), kind: argument.kind_name() });
            };
            match (argument_value(previous, &declared.name), argument_value(next, &declared.name)) {
                (None, None) => {}
                (Some(previous), Some(next)) => {
                    if let Some(change) = self.diff(previous, next, &declared.value, child_path(&path, &declared.name)).await? {
                        return Ok(Some(change));
                    }
                }
                _ => return changed(),
            }
        }
        if argument_names(next).any(|name| argument_value(previous, name).is_none()) {
            return changed();
        }
        Ok(None)
    }

    async fn function_definition(&self, function: &FunctionValue) -> Result<FunctionDefinition, SchemaError> {
        self.definitions
            .function_definition(&function.provider_id, &function.function_name)
            .await
            .map_err(|source| SchemaError::Definition { subject: function_subject(&function.provider_id, &function.function_name), source })
    }
}

fn argument_value<'v>(function: &'v FunctionValue, name: &str) -> Option<&'v Value> {
    function.argument_values.iter().find_map(|argument| match &argument.kind {
        ValueKind::FunctionArgument(argument) if argument.name == name => Some(argument.value.as_ref()),
        _ => None,
    })
}

fn argument_names(function: &FunctionValue) -> impl Iterator<Item = &str> {
    function.argument_values.iter().filter_map(|argument| match &argument.kind {
        ValueKind::FunctionArgument(argument) => Some(argument.name.as_str()),
        _ => None,
    })
}
