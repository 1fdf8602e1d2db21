//! Array(T) columns.
//!
//! On the wire an array column is its offsets (cumulative end positions,
//! one UInt64 per row) followed by the flattened nested column. Nested
//! arrays put the offsets of every level first, outermost level first, and
//! the leaf data last:
//!
//! ```text
//! Array(Array(Int32)) with rows [[1, 2], [3]] and [[]]
//!
//! level 0 offsets: 2 3        (row 0 has 2 sub-arrays, row 1 has 1)
//! level 1 offsets: 2 3 3      (sub-arrays of 2, 1 and 0 ints)
//! leaf:            1 2 3
//! ```
//!
//! Both directions walk the levels iteratively rather than recursing per
//! row, so deep nesting costs one pass per level.

use std::any::Any;

use async_trait::async_trait;
use bytes::BytesMut;

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

pub struct ColumnArray {
    type_: Type,
    nested: ColumnRef,
    options: ColumnOptions,
}

impl ColumnArray {
    pub fn new(type_: Type, nested: ColumnRef, options: ColumnOptions) -> Self {
        Self { type_, nested, options }
    }

    pub fn nested(&self) -> &ColumnRef {
        &self.nested
    }
}

/// Check offsets are non-decreasing; returns the final offset.
pub(crate) fn validate_offsets(offsets: &[u64]) -> Result<u64> {
    let mut previous = 0;
    for &offset in offsets {
        if offset < previous {
            return Err(Error::Protocol(format!(
                "array offsets are decreasing: {} after {}",
                offset, previous
            )));
        }
        previous = offset;
    }
    Ok(previous)
}

/// Regroup a flat list into consecutive slices ending at each offset.
pub(crate) fn split_by_offsets<T>(
    flat: Vec<T>,
    offsets: &[u64],
) -> Vec<Vec<T>> {
    let mut rest = flat.into_iter();
    let mut previous = 0;
    offsets
        .iter()
        .map(|&end| {
            let group = rest.by_ref().take((end - previous) as usize).collect();
            previous = end;
            group
        })
        .collect()
}

#[async_trait]
impl Column for ColumnArray {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Array(Vec::new())
    }

    async fn read_state_prefix(
        &self,
        reader: &mut BufferedReader<'_>,
    ) -> Result<()> {
        self.nested.read_state_prefix(reader).await
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let mut levels: Vec<Vec<u64>> = Vec::new();
        let mut column: &dyn Column = self;
        let mut count = rows;
        while let Some(array) = column.as_any().downcast_ref::<ColumnArray>() {
            let offsets = ColumnVector::<u64>::read_raw(reader, count).await?;
            count = usize::try_from(validate_offsets(&offsets)?).map_err(
                |_| Error::Protocol("array offset overflows usize".to_string()),
            )?;
            levels.push(offsets);
            column = array.nested.as_ref();
        }

        let mut items = column.read_items(reader, count).await?;
        for offsets in levels.iter().rev() {
            items = split_by_offsets(items, offsets)
                .into_iter()
                .map(Value::Array)
                .collect();
        }
        Ok(items)
    }

    fn write_state_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.nested.write_state_prefix(buffer)
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let empty = Value::Array(Vec::new());
        let mut level: Vec<&Value> = items.iter().collect();
        let mut column: &dyn Column = self;
        while let Some(array) = column.as_any().downcast_ref::<ColumnArray>() {
            let mut offsets = Vec::with_capacity(level.len());
            let mut flat = Vec::new();
            for item in level {
                let item =
                    resolve_null(item, &empty, &array.options, &array.type_)?;
                let elements = item
                    .as_slice()
                    .ok_or_else(|| Error::mismatch(array.type_.name(), item))?;
                flat.extend(elements);
                offsets.push(flat.len() as u64);
            }
            ColumnVector::<u64>::write_raw(&offsets, buffer);
            level = flat;
            column = array.nested.as_ref();
        }

        let leaf: Vec<Value> = level.into_iter().cloned().collect();
        column.write_items(&leaf, buffer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{
        decode,
        encode,
        roundtrip,
    };
    use super::super::{
        column_by_spec,
        ColumnOptions,
    };
    use super::*;

    fn arr(items: Vec<Value>) -> Value {
        Value::Array(items)
    }

    fn ints(items: &[i32]) -> Value {
        arr(items.iter().map(|v| Value::Int32(*v)).collect())
    }

    #[tokio::test]
    async fn test_flat_array_layout() {
        let values = vec![ints(&[1, 2]), ints(&[]), ints(&[3])];
        let bytes = encode("Array(Int32)", &values);
        let mut expected = Vec::new();
        for offset in [2u64, 2, 3] {
            expected.extend_from_slice(&offset.to_le_bytes());
        }
        for v in [1i32, 2, 3] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(&bytes[..], &expected[..]);
        assert_eq!(decode("Array(Int32)", &bytes, 3).await, values);
    }

    #[tokio::test]
    async fn test_nested_arrays() {
        let values = vec![
            arr(vec![ints(&[1, 2]), ints(&[3])]),
            arr(vec![ints(&[])]),
            arr(vec![]),
        ];
        let bytes = encode("Array(Array(Int32))", &values);
        // 3 + 3 offsets, then 3 ints.
        assert_eq!(bytes.len(), 6 * 8 + 3 * 4);
        assert_eq!(&bytes[..8], &2u64.to_le_bytes());
        assert_eq!(roundtrip("Array(Array(Int32))", &values).await, values);
    }

    #[tokio::test]
    async fn test_array_of_strings_and_tuples() {
        let values = vec![arr(vec![Value::from("a"), Value::from("bc")])];
        assert_eq!(roundtrip("Array(String)", &values).await, values);

        let values = vec![arr(vec![Value::Tuple(vec![
            Value::UInt8(1),
            Value::from("x"),
        ])])];
        assert_eq!(
            roundtrip("Array(Tuple(UInt8, String))", &values).await,
            values
        );
    }

    #[tokio::test]
    async fn test_decreasing_offsets_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&2u64.to_le_bytes());
        data.extend_from_slice(&1u64.to_le_bytes());
        let column =
            column_by_spec("Array(UInt8)", ColumnOptions::default()).unwrap();
        let mut reader = BufferedReader::from_bytes(data);
        assert!(matches!(
            column.read_items(&mut reader, 2).await,
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_non_array_is_mismatch() {
        let column =
            column_by_spec("Array(UInt8)", ColumnOptions::default()).unwrap();
        let mut buf = BytesMut::new();
        assert!(matches!(
            column.write_items(&[Value::UInt8(1)], &mut buf),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_split_by_offsets() {
        assert_eq!(
            split_by_offsets(vec![1, 2, 3], &[1, 1, 3]),
            vec![vec![1], vec![], vec![2, 3]]
        );
        assert_eq!(validate_offsets(&[0, 4, 4]).unwrap(), 4);
        assert_eq!(validate_offsets(&[]).unwrap(), 0);
    }
}
