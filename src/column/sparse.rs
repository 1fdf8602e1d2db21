//! Sparse column serialization.
//!
//! When a block column carries the custom serialization flag, the server
//! first sends a serialization kind. A non-zero kind means the column is
//! sparse: instead of every row it sends the gaps between non-default
//! rows, then only the non-default values.
//!
//! ```text
//! rows:   0 0 7 0 0 0 9 0
//! gaps:   2 3 (1 | END_OF_GRANULE)
//! values: 7 9
//! ```
//!
//! Each gap counts the default rows before the next non-default one; the
//! last gap, flagged with [`END_OF_GRANULE`], counts trailing defaults.

use super::{
    Column,
    Value,
};
use crate::io::BufferedReader;
use crate::{
    Error,
    Result,
};

pub const END_OF_GRANULE: u64 = 1 << 62;

/// Positions (1-based) of non-default rows and the total row count.
async fn read_offsets(
    reader: &mut BufferedReader<'_>,
) -> Result<(Vec<u64>, u64)> {
    let mut positions = Vec::new();
    let mut total = 0u64;
    loop {
        let group = reader.read_varint().await?;
        let end = group & END_OF_GRANULE != 0;
        total = total
            .checked_add((group & !END_OF_GRANULE) + 1)
            .ok_or_else(|| Error::Protocol("sparse offsets overflow".into()))?;
        if end {
            return Ok((positions, total - 1));
        }
        positions.push(total);
    }
}

/// Read one top-level block column: optional serialization kind, state
/// prefix, then either dense or sparse items.
pub async fn read_column(
    column: &dyn Column,
    reader: &mut BufferedReader<'_>,
    rows: usize,
    has_custom_serialization: bool,
) -> Result<Vec<Value>> {
    let sparse = has_custom_serialization && reader.read_varint().await? != 0;
    column.read_state_prefix(reader).await?;
    if !sparse {
        return column.read_items(reader, rows).await;
    }

    let (positions, total) = read_offsets(reader).await?;
    if total != rows as u64 {
        return Err(Error::Protocol(format!(
            "sparse column has {} rows, block has {}",
            total, rows
        )));
    }
    let values = column.read_items(reader, positions.len()).await?;
    let mut items = vec![column.null_value(); rows];
    for (position, value) in positions.into_iter().zip(values) {
        items[position as usize - 1] = value;
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::super::{
        column_by_spec,
        ColumnOptions,
    };
    use super::*;
    use crate::io::buffer_utils::write_varint;

    async fn read(spec: &str, data: BytesMut, rows: usize, custom: bool) -> Vec<Value> {
        let column = column_by_spec(spec, ColumnOptions::default()).unwrap();
        let mut reader = BufferedReader::from_bytes(data.freeze());
        let items = read_column(column.as_ref(), &mut reader, rows, custom)
            .await
            .unwrap();
        assert_eq!(reader.remaining_buffered(), 0);
        items
    }

    #[tokio::test]
    async fn test_sparse_ints() {
        let mut data = BytesMut::new();
        write_varint(&mut data, 1);
        for gap in [2, 3, 1 | END_OF_GRANULE] {
            write_varint(&mut data, gap);
        }
        data.extend_from_slice(&[7, 9]);
        let items = read("UInt8", data, 8, true).await;
        let expected: Vec<Value> =
            [0u8, 0, 7, 0, 0, 0, 9, 0].into_iter().map(Value::UInt8).collect();
        assert_eq!(items, expected);
    }

    #[tokio::test]
    async fn test_sparse_nullable_defaults_to_null() {
        let mut data = BytesMut::new();
        write_varint(&mut data, 1);
        write_varint(&mut data, 1);
        write_varint(&mut data, END_OF_GRANULE);
        // One non-default value: null map then the value.
        data.extend_from_slice(&[0, 1, b'z']);
        let items = read("Nullable(String)", data, 2, true).await;
        assert_eq!(items, vec![Value::Null, Value::from("z")]);
    }

    #[tokio::test]
    async fn test_all_defaults() {
        let mut data = BytesMut::new();
        write_varint(&mut data, 1);
        write_varint(&mut data, 3 | END_OF_GRANULE);
        let items = read("Int32", data, 3, true).await;
        assert_eq!(items, vec![Value::Int32(0); 3]);
    }

    #[tokio::test]
    async fn test_dense_with_flag_and_without() {
        let mut data = BytesMut::new();
        write_varint(&mut data, 0);
        data.extend_from_slice(&[5]);
        assert_eq!(read("UInt8", data, 1, true).await, vec![Value::UInt8(5)]);

        let data = BytesMut::from(&[6u8][..]);
        assert_eq!(read("UInt8", data, 1, false).await, vec![Value::UInt8(6)]);
    }

    #[tokio::test]
    async fn test_row_count_mismatch() {
        let mut data = BytesMut::new();
        write_varint(&mut data, 1);
        write_varint(&mut data, 5 | END_OF_GRANULE);
        let column = column_by_spec("UInt8", ColumnOptions::default()).unwrap();
        let mut reader = BufferedReader::from_bytes(data.freeze());
        assert!(matches!(
            read_column(column.as_ref(), &mut reader, 2, true).await,
            Err(Error::Protocol(_))
        ));
    }
}
