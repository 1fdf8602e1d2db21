use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use bytes::BytesMut;

use super::numeric::ColumnVector;
use super::{
    resolve_null,
    Column,
    ColumnOptions,
    Value,
};
use crate::io::BufferedReader;
use crate::types::{
    EnumItem,
    Type,
};
use crate::{
    Error,
    Result,
};

/// Enum8 and Enum16 columns. Items are read as their names; on write either
/// the name or the numeric value of an item is accepted.
pub struct ColumnEnum {
    type_: Type,
    items: Vec<EnumItem>,
    by_name: HashMap<String, i16>,
    by_value: HashMap<i16, String>,
    options: ColumnOptions,
}

impl ColumnEnum {
    pub fn new(type_: Type, items: Vec<EnumItem>, options: ColumnOptions) -> Self {
        let by_name =
            items.iter().map(|i| (i.name.clone(), i.value)).collect();
        let by_value =
            items.iter().map(|i| (i.value, i.name.clone())).collect();
        Self { type_, items, by_name, by_value, options }
    }

    fn is_enum8(&self) -> bool {
        matches!(self.type_, Type::Enum8 { .. })
    }

    fn unknown_element(&self, item: &Value) -> Error {
        let shown = match item {
            Value::String(s) => s.clone(),
            other => other
                .as_i128()
                .map_or_else(|| format!("{:?}", other), |v| v.to_string()),
        };
        Error::Logical(format!(
            "Unknown element '{}' for type {}",
            shown, self.type_
        ))
    }

    fn encode(&self, item: &Value) -> Result<i16> {
        let value = match item {
            Value::String(name) => self.by_name.get(name).copied(),
            other => other
                .as_i128()
                .and_then(|v| i16::try_from(v).ok())
                .filter(|v| self.by_value.contains_key(v)),
        };
        value.ok_or_else(|| self.unknown_element(item))
    }

    fn decode(&self, raw: i16) -> Result<Value> {
        self.by_value
            .get(&raw)
            .map(|name| Value::String(name.clone()))
            .ok_or_else(|| {
                Error::Logical(format!(
                    "Unknown enum value {} for type {}",
                    raw, self.type_
                ))
            })
    }
}

#[async_trait]
impl Column for ColumnEnum {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        self.items
            .first()
            .map_or(Value::Int16(0), |i| Value::String(i.name.clone()))
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let raw: Vec<i16> = if self.is_enum8() {
            ColumnVector::<i8>::read_raw(reader, rows)
                .await?
                .into_iter()
                .map(i16::from)
                .collect()
        } else {
            ColumnVector::<i16>::read_raw(reader, rows).await?
        };
        raw.into_iter().map(|v| self.decode(v)).collect()
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        let mut raw = Vec::with_capacity(items.len());
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            raw.push(self.encode(item)?);
        }
        if self.is_enum8() {
            // Enum8 item values are validated to fit i8 by the type parser.
            let narrow: Vec<i8> = raw.iter().map(|v| *v as i8).collect();
            ColumnVector::<i8>::write_raw(&narrow, buffer);
        } else {
            ColumnVector::<i16>::write_raw(&raw, buffer);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{
        encode,
        roundtrip,
    };
    use super::super::column_by_spec;
    use super::*;

    const ENUM8: &str = "Enum8('a' = 1, 'b' = -2)";

    #[tokio::test]
    async fn test_names_and_values() {
        let bytes = encode(ENUM8, &[Value::from("b"), Value::Int32(1)]);
        assert_eq!(&bytes[..], &[0xFE, 0x01]);
        let out = roundtrip(ENUM8, &[Value::from("b"), Value::Int32(1)]).await;
        assert_eq!(out, vec![Value::from("b"), Value::from("a")]);
    }

    #[tokio::test]
    async fn test_enum16_width() {
        let spec = "Enum16('big' = 1000, 'neg' = -1000)";
        let bytes = encode(spec, &[Value::from("big")]);
        assert_eq!(&bytes[..], &1000i16.to_le_bytes());
        let out = roundtrip(spec, &[Value::Int16(-1000)]).await;
        assert_eq!(out, vec![Value::from("neg")]);
    }

    #[test]
    fn test_unknown_element() {
        let column = column_by_spec(ENUM8, ColumnOptions::default()).unwrap();
        let mut buf = BytesMut::new();
        let err = column.write_items(&[Value::from("c")], &mut buf).unwrap_err();
        match err {
            Error::Logical(message) => assert_eq!(
                message,
                "Unknown element 'c' for type Enum8('a' = 1, 'b' = -2)"
            ),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(column.write_items(&[Value::Int8(3)], &mut buf).is_err());
    }

    #[tokio::test]
    async fn test_unknown_value_on_read() {
        let column = column_by_spec(ENUM8, ColumnOptions::default()).unwrap();
        let mut reader = BufferedReader::from_bytes(vec![7u8]);
        assert!(matches!(
            column.read_items(&mut reader, 1).await,
            Err(Error::Logical(_))
        ));
    }
}
