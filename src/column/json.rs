//! Object('json') columns.
//!
//! The server sends JSON data as a dynamically typed column: after a
//! version byte, each block names the concrete type of its rows (usually a
//! named tuple) and then carries that column. Rows written by the client
//! are JSON text, one string per row.

use std::any::Any;

use async_trait::async_trait;
use bytes::{
    BufMut,
    BytesMut,
};
use serde_json::{
    Map as JsonMap,
    Number,
    Value as JsonValue,
};

use super::{
    column_by_spec,
    resolve_null,
    Column,
    ColumnOptions,
    Value,
};
use crate::io::buffer_utils;
use crate::io::BufferedReader;
use crate::types::Type;
use crate::{
    Error,
    Result,
};

const SERIALIZATION_VERSION: u8 = 1;

pub struct ColumnJson {
    type_: Type,
    options: ColumnOptions,
}

impl ColumnJson {
    pub fn new(options: ColumnOptions) -> Self {
        Self { type_: Type::Json, options }
    }
}

/// Turn named tuples into objects, following the concrete row type.
fn to_object(value: Value, ty: &Type) -> Value {
    match (value, ty) {
        (Value::Tuple(items), Type::Tuple { item_types, names })
            if !names.is_empty() =>
        {
            Value::Object(
                names
                    .iter()
                    .cloned()
                    .zip(items.into_iter().zip(item_types))
                    .map(|(name, (item, ty))| (name, to_object(item, ty)))
                    .collect(),
            )
        }
        (Value::Tuple(items), Type::Tuple { item_types, .. }) => Value::Tuple(
            items
                .into_iter()
                .zip(item_types)
                .map(|(item, ty)| to_object(item, ty))
                .collect(),
        ),
        (Value::Array(items), Type::Array { item_type }) => Value::Array(
            items.into_iter().map(|item| to_object(item, item_type)).collect(),
        ),
        (value, Type::Nullable { nested_type }) if !value.is_null() => {
            to_object(value, nested_type)
        }
        (value, _) => value,
    }
}

/// Convert a cell to JSON. Values without a JSON counterpart become their
/// text form.
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(v) => JsonValue::Bool(*v),
        Value::Float32(v) => {
            Number::from_f64(*v as f64).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::Float64(v) => {
            Number::from_f64(*v).map_or(JsonValue::Null, JsonValue::Number)
        }
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Bytes(b) => {
            JsonValue::String(String::from_utf8_lossy(b).into_owned())
        }
        Value::Array(items) | Value::Tuple(items) => {
            JsonValue::Array(items.iter().map(to_json).collect())
        }
        Value::Object(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect::<JsonMap<_, _>>(),
        ),
        Value::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(k, v)| (json_key(k), to_json(v)))
                .collect::<JsonMap<_, _>>(),
        ),
        other => match (other.as_i128(), other.as_u128()) {
            (Some(v), _) if i64::try_from(v).is_ok() => {
                JsonValue::Number(Number::from(v as i64))
            }
            (_, Some(v)) if u64::try_from(v).is_ok() => {
                JsonValue::Number(Number::from(v as u64))
            }
            _ => JsonValue::String(text(other)),
        },
    }
}

fn json_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => text(other),
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Int128(v) => v.to_string(),
        Value::UInt128(v) => v.to_string(),
        Value::Int256(v) => v.to_string(),
        Value::UInt256(v) => v.to_string(),
        Value::Decimal(v) => v.to_string(),
        Value::Date(v) => v.to_string(),
        Value::DateTime(v) => v.to_rfc3339(),
        Value::Uuid(v) => v.to_string(),
        Value::Ipv4(v) => v.to_string(),
        Value::Ipv6(v) => v.to_string(),
        other => format!("{:?}", other),
    }
}

#[async_trait]
impl Column for ColumnJson {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Object(Vec::new())
    }

    async fn read_state_prefix(
        &self,
        reader: &mut BufferedReader<'_>,
    ) -> Result<()> {
        reader.read_u8().await?;
        Ok(())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let spec = reader.read_string().await?;
        let column = column_by_spec(&spec, self.options)?;
        column.read_state_prefix(reader).await?;
        let items = column.read_items(reader, rows).await?;
        let row_type = column.column_type();
        Ok(items.into_iter().map(|item| to_object(item, row_type)).collect())
    }

    fn write_state_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_u8(SERIALIZATION_VERSION);
        Ok(())
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            let encoded = match item {
                Value::String(s) => s.clone(),
                Value::Object(_) | Value::Map(_) => {
                    serde_json::to_string(&to_json(item)).map_err(|e| {
                        Error::InvalidArgument(format!("JSON encoding: {}", e))
                    })?
                }
                other => return Err(Error::mismatch(self.type_.name(), other)),
            };
            buffer_utils::write_string(buffer, &encoded);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::encode;
    use super::*;

    #[tokio::test]
    async fn test_read_named_tuple_as_object() {
        let mut data = BytesMut::new();
        data.put_u8(1);
        buffer_utils::write_string(
            &mut data,
            "Tuple(id Int8, tags Array(String), inner Tuple(ok Bool))",
        );
        data.extend_from_slice(&[5, 6]);
        data.extend_from_slice(&1u64.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes());
        data.extend_from_slice(&[1, b'a']);
        data.extend_from_slice(&[1, 0]);

        let column = ColumnJson::new(ColumnOptions::default());
        let mut reader = BufferedReader::from_bytes(data.freeze());
        column.read_state_prefix(&mut reader).await.unwrap();
        let items = column.read_items(&mut reader, 2).await.unwrap();
        assert_eq!(
            items[0],
            Value::Object(vec![
                ("id".into(), Value::Int8(5)),
                ("tags".into(), Value::Array(vec![Value::from("a")])),
                (
                    "inner".into(),
                    Value::Object(vec![("ok".into(), Value::Bool(true))])
                ),
            ])
        );
        assert_eq!(
            to_json(&items[1]),
            serde_json::json!({"id": 6, "tags": [], "inner": {"ok": false}})
        );
    }

    #[test]
    fn test_write_as_text() {
        let object = Value::Object(vec![
            ("a".into(), Value::UInt64(1)),
            ("b".into(), Value::Array(vec![Value::Float64(0.5), Value::Null])),
        ]);
        let bytes = encode("Object('json')", &[object, Value::from("{}")]);
        let mut expected = BytesMut::new();
        expected.put_u8(1);
        buffer_utils::write_string(&mut expected, r#"{"a":1,"b":[0.5,null]}"#);
        buffer_utils::write_string(&mut expected, "{}");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_to_json_fallbacks() {
        assert_eq!(
            to_json(&Value::UInt128(u128::MAX)),
            JsonValue::String(u128::MAX.to_string())
        );
        assert_eq!(to_json(&Value::UInt64(u64::MAX)), serde_json::json!(u64::MAX));
        assert_eq!(
            to_json(&Value::Ipv4("1.2.3.4".parse().unwrap())),
            serde_json::json!("1.2.3.4")
        );
    }
}
