use crate::{OutputValue, Value, ValueKind};

/// Collect every output reference in `value`, depth first, in declaration order.
pub fn output_dependencies(value: &Value) -> Vec<&OutputValue> {
    let mut found = Vec::new();
    collect(value, &mut found);
    found
}

fn collect<'a>(value: &'a Value, found: &mut Vec<&'a OutputValue>) {
    match &value.kind {
        ValueKind::Output(reference) => found.push(reference),
        ValueKind::Scalar(_) | ValueKind::Configuration(_) => {}
        ValueKind::List(list) => list.values.iter().for_each(|element| collect(element, found)),
        ValueKind::Map(fields) | ValueKind::Object(fields) => fields.fields.iter().for_each(|field| collect(field, found)),
        ValueKind::Field(field) => collect(&field.value, found),
        ValueKind::Function(function) => function.argument_values.iter().for_each(|argument| collect(argument, found)),
        ValueKind::FunctionArgument(argument) => collect(&argument.value, found),
    }
}
