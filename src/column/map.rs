use std::any::Any;

use async_trait::async_trait;
use bytes::BytesMut;

use super::array::{
    split_by_offsets,
    validate_offsets,
};
use super::numeric::ColumnVector;
use super::{
    resolve_null,
    Column,
    ColumnOptions,
    ColumnRef,
    Value,
};
use crate::io::BufferedReader;
use crate::types::Type;
use crate::{
    Error,
    Result,
};

/// Map(K, V): offsets as for an array, then all keys, then all values.
/// Rows are `Value::Map` with entries in wire order.
pub struct ColumnMap {
    type_: Type,
    keys: ColumnRef,
    values: ColumnRef,
    options: ColumnOptions,
}

impl ColumnMap {
    pub fn new(
        type_: Type,
        keys: ColumnRef,
        values: ColumnRef,
        options: ColumnOptions,
    ) -> Self {
        Self { type_, keys, values, options }
    }
}

#[async_trait]
impl Column for ColumnMap {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Map(Vec::new())
    }

    async fn read_state_prefix(
        &self,
        reader: &mut BufferedReader<'_>,
    ) -> Result<()> {
        self.keys.read_state_prefix(reader).await?;
        self.values.read_state_prefix(reader).await
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let offsets = ColumnVector::<u64>::read_raw(reader, rows).await?;
        let total = validate_offsets(&offsets)? as usize;
        let keys = self.keys.read_items(reader, total).await?;
        let values = self.values.read_items(reader, total).await?;
        let entries: Vec<(Value, Value)> = keys.into_iter().zip(values).collect();
        Ok(split_by_offsets(entries, &offsets)
            .into_iter()
            .map(Value::Map)
            .collect())
    }

    fn write_state_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.keys.write_state_prefix(buffer)?;
        self.values.write_state_prefix(buffer)
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        let mut offsets = Vec::with_capacity(items.len());
        let mut keys = Vec::new();
        let mut values = Vec::new();
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            let Value::Map(entries) = item else {
                return Err(Error::mismatch(self.type_.name(), item));
            };
            for (key, value) in entries {
                keys.push(key.clone());
                values.push(value.clone());
            }
            offsets.push(keys.len() as u64);
        }
        ColumnVector::<u64>::write_raw(&offsets, buffer);
        self.keys.write_items(&keys, buffer)?;
        self.values.write_items(&values, buffer)
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

    fn map(entries: &[(&str, u64)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (Value::from(*k), Value::UInt64(*v)))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_map_layout() {
        let values = vec![map(&[("a", 1), ("b", 2)]), map(&[])];
        let bytes = encode("Map(String, UInt64)", &values);
        let mut expected = Vec::new();
        expected.extend_from_slice(&2u64.to_le_bytes());
        expected.extend_from_slice(&2u64.to_le_bytes());
        expected.extend_from_slice(&[1, b'a', 1, b'b']);
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.extend_from_slice(&2u64.to_le_bytes());
        assert_eq!(&bytes[..], &expected[..]);
        assert_eq!(roundtrip("Map(String, UInt64)", &values).await, values);
    }

    #[tokio::test]
    async fn test_map_with_low_cardinality_keys() {
        let values = vec![map(&[("x", 7)]), map(&[("x", 8), ("y", 9)])];
        assert_eq!(
            roundtrip("Map(LowCardinality(String), UInt64)", &values).await,
            values
        );
    }

    #[test]
    fn test_non_map_is_mismatch() {
        let column =
            column_by_spec("Map(String, UInt64)", ColumnOptions::default())
                .unwrap();
        let mut buf = BytesMut::new();
        assert!(column
            .write_items(&[Value::Array(vec![])], &mut buf)
            .is_err());
    }
}
