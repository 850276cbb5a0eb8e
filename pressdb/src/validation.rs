use crate::schema::{FieldType, ResolvedCollection, ResolvedField};
use serde_json::{Map, Value};

/// Validate and coerce a candidate record against a collection's extended
/// schema. Returns the record with defaults applied and scalar coercions
/// performed, or the list of failures with the offending field path.
pub fn validate_record(
    collection: &ResolvedCollection,
    mut candidate: Map<String, Value>,
) -> std::result::Result<Map<String, Value>, Vec<String>> {
    let mut errors = Vec::new();
    let mut record = Map::with_capacity(collection.fields.len());

    for field in &collection.fields {
        let value = candidate.remove(&field.name);
        match value {
            None | Some(Value::Null) => {
                if let Some(default) = &field.default {
                    record.insert(field.name.clone(), default.clone());
                } else if field.required {
                    errors.push(format!("Required field '{}' is missing", field.name));
                } else {
                    record.insert(field.name.clone(), Value::Null);
                }
            }
            Some(value) => match coerce(field, value) {
                Ok(value) => {
                    record.insert(field.name.clone(), value);
                }
                Err(message) => errors.push(message),
            },
        }
    }

    for name in candidate.keys() {
        errors.push(format!(
            "Unexpected field '{name}' not present in the extended schema"
        ));
    }

    if errors.is_empty() {
        Ok(record)
    } else {
        Err(errors)
    }
}

fn coerce(field: &ResolvedField, value: Value) -> std::result::Result<Value, String> {
    let coerced = match &field.field_type {
        FieldType::String => match value {
            Value::String(s) => Value::String(s),
            Value::Number(n) => Value::String(n.to_string()),
            Value::Bool(b) => Value::String(b.to_string()),
            other => return Err(mismatch(field, "string", &other)),
        },
        FieldType::Number => match value {
            Value::Number(n) => Value::Number(n),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(parsed) => serde_json::Number::from_f64(parsed)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        format!("Field '{}' is not a finite number: {s}", field.name)
                    })?,
                Err(_) => return Err(mismatch(field, "number", &Value::String(s))),
            },
            other => return Err(mismatch(field, "number", &other)),
        },
        FieldType::Boolean => match value {
            Value::Bool(b) => Value::Bool(b),
            Value::String(s) => match s.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => return Err(mismatch(field, "boolean", &Value::String(s))),
            },
            other => return Err(mismatch(field, "boolean", &other)),
        },
        FieldType::Date => match &value {
            Value::String(s) if s.parse::<chrono::NaiveDate>().is_ok() => value,
            other => return Err(mismatch(field, "date", other)),
        },
        FieldType::Datetime => match &value {
            Value::String(s)
                if chrono::DateTime::parse_from_rfc3339(s).is_ok()
                    || s.parse::<chrono::NaiveDateTime>().is_ok() =>
            {
                value
            }
            other => return Err(mismatch(field, "datetime", other)),
        },
        FieldType::List => match value {
            Value::Array(items) => Value::Array(items),
            other => return Err(mismatch(field, "list", &other)),
        },
        FieldType::Object => match value {
            Value::Object(map) => Value::Object(map),
            other => return Err(mismatch(field, "object", &other)),
        },
    };

    if let Some(enum_values) = &field.enum_values {
        if let Value::String(s) = &coerced {
            if !enum_values.contains(s) {
                return Err(format!(
                    "Field '{}' value '{s}' is not in enum: {enum_values:?}",
                    field.name
                ));
            }
        }
    }

    Ok(coerced)
}

fn mismatch(field: &ResolvedField, expected: &str, got: &Value) -> String {
    format!(
        "Field '{}' expected {expected}, got {}",
        field.name,
        type_name(got)
    )
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
