//! Row decoding and the decoded row type.
//!
//! Each data line of a streamed response is a bare JSON array, positional to
//! the response's [`ColumnSchema`]. Decoding dispatches on the declared
//! [`ColumnType`] per position. A value whose JSON kind does not match its
//! declared type degrades to [`KsqlValue::Null`]; structural violations
//! (wrong row length, a struct field the schema does not declare) fail the
//! row with [`KsqlError::Protocol`] and terminate the stream.

use crate::error::KsqlError;
use crate::schema::{ColumnSchema, ColumnType};
use crate::value::{number_to_decimal, number_to_value, KsqlObject, KsqlValue};
use rust_decimal::Decimal;
use std::sync::Arc;

/// One decoded result row, bound to the schema of its response.
///
/// Column indices are 1-based at this boundary (column 1 is the first
/// column), matching SQL result-set conventions. Passing 0 or an
/// out-of-range index is a usage error and panics; it is never a decode
/// error.
#[derive(Debug, Clone)]
pub struct Row {
    schema: Arc<ColumnSchema>,
    values: Vec<KsqlValue>,
}

impl Row {
    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    /// All values in column order.
    pub fn values(&self) -> &[KsqlValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<KsqlValue> {
        self.values
    }

    /// Value of the 1-based `column`.
    ///
    /// # Panics
    /// If `column` is 0 or greater than the column count.
    pub fn get(&self, column: usize) -> &KsqlValue {
        self.try_get(column).unwrap_or_else(|| {
            panic!(
                "column index {column} out of range 1..={}",
                self.values.len()
            )
        })
    }

    /// Value of the named column.
    ///
    /// # Panics
    /// If no column has that name.
    pub fn get_named(&self, name: &str) -> &KsqlValue {
        self.try_get_named(name)
            .unwrap_or_else(|| panic!("no column named {name}"))
    }

    pub fn try_get(&self, column: usize) -> Option<&KsqlValue> {
        column.checked_sub(1).and_then(|i| self.values.get(i))
    }

    pub fn try_get_named(&self, name: &str) -> Option<&KsqlValue> {
        self.schema.index_of(name).map(|i| &self.values[i])
    }

    pub fn get_string(&self, column: usize) -> Option<&str> {
        self.get(column).as_str()
    }

    pub fn get_i32(&self, column: usize) -> Option<i32> {
        self.get(column).as_i32()
    }

    pub fn get_i64(&self, column: usize) -> Option<i64> {
        self.get(column).as_i64()
    }

    pub fn get_f64(&self, column: usize) -> Option<f64> {
        self.get(column).as_f64()
    }

    pub fn get_decimal(&self, column: usize) -> Option<Decimal> {
        self.get(column).as_decimal()
    }

    pub fn get_bool(&self, column: usize) -> Option<bool> {
        self.get(column).as_bool()
    }

    pub fn get_array(&self, column: usize) -> Option<&[KsqlValue]> {
        self.get(column).as_array()
    }

    pub fn get_object(&self, column: usize) -> Option<&KsqlObject> {
        self.get(column).as_object()
    }

    pub fn is_null(&self, column: usize) -> bool {
        self.get(column).is_null()
    }

    /// The row as a name→value object in column order.
    pub fn to_object(&self) -> KsqlObject {
        self.schema
            .columns()
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.name.clone(), v.clone()))
            .collect()
    }
}

/// Decodes one raw row line against `schema`.
pub(crate) fn decode_row(schema: &Arc<ColumnSchema>, raw: &serde_json::Value) -> Result<Row, KsqlError> {
    let raw_values = raw.as_array().ok_or_else(|| {
        KsqlError::protocol("Expected a JSON array row line")
    })?;
    if raw_values.len() != schema.len() {
        return Err(KsqlError::protocol(format!(
            "Row has {} values but the schema declares {} columns",
            raw_values.len(),
            schema.len()
        )));
    }

    let values = schema
        .columns()
        .iter()
        .zip(raw_values)
        .map(|(column, raw_value)| decode_value(&column.column_type, raw_value))
        .collect::<Result<Vec<_>, KsqlError>>()?;

    Ok(Row {
        schema: Arc::clone(schema),
        values,
    })
}

/// Decodes a single value for its declared type.
///
/// Only struct-field mismatches are errors; every other failure mode is a
/// per-value degradation to `Null`.
pub(crate) fn decode_value(
    column_type: &ColumnType,
    raw: &serde_json::Value,
) -> Result<KsqlValue, KsqlError> {
    use serde_json::Value;

    let value = match (column_type, raw) {
        (ColumnType::String, Value::String(s)) => KsqlValue::String(s.clone()),
        (ColumnType::Integer, Value::Number(n)) => match number_to_value(n) {
            v @ KsqlValue::Integer(_) => v,
            _ => KsqlValue::Null,
        },
        (ColumnType::Bigint, Value::Number(n)) => {
            n.as_i64().map_or(KsqlValue::Null, KsqlValue::Bigint)
        }
        (ColumnType::Double, Value::Number(n)) => {
            n.as_f64().map_or(KsqlValue::Null, KsqlValue::Double)
        }
        (ColumnType::Decimal, Value::Number(n)) => {
            number_to_decimal(n).map_or(KsqlValue::Null, KsqlValue::Decimal)
        }
        (ColumnType::Boolean, Value::Bool(b)) => KsqlValue::Bool(*b),
        (ColumnType::Array(element_type), Value::Array(items)) => {
            let elements = items
                .iter()
                .map(|item| decode_value(element_type, item))
                .collect::<Result<Vec<_>, KsqlError>>()?;
            KsqlValue::Array(elements)
        }
        (ColumnType::Map(value_type), Value::Object(entries)) => {
            let mut object = KsqlObject::new();
            for (key, entry) in entries {
                object.push_entry(key.clone(), decode_value(value_type, entry)?);
            }
            KsqlValue::Object(object)
        }
        (ColumnType::Struct(fields), Value::Object(entries)) => {
            let mut object = KsqlObject::new();
            for (key, entry) in entries {
                let field_type = fields
                    .iter()
                    .find(|(name, _)| name == key)
                    .map(|(_, t)| t)
                    .ok_or_else(|| {
                        let expected: Vec<&str> =
                            fields.iter().map(|(name, _)| name.as_str()).collect();
                        KsqlError::protocol(format!(
                            "Unexpected struct field {key}. Expected fields: {}",
                            expected.join(",")
                        ))
                    })?;
                object.push_entry(key.clone(), decode_value(field_type, entry)?);
            }
            KsqlValue::Object(object)
        }
        // JSON null or a kind mismatch: degrade, never fail the row.
        _ => KsqlValue::Null,
    };
    Ok(value)
}
