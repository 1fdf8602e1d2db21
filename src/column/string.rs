use std::any::Any;

use async_trait::async_trait;
use bytes::{
    BufMut,
    BytesMut,
};

use super::{
    resolve_null,
    Column,
    ColumnOptions,
    Value,
};
use crate::io::buffer_utils;
use crate::io::BufferedReader;
use crate::types::{
    Type,
    TypeCode,
};
use crate::{
    Error,
    Result,
};

fn empty_string(options: &ColumnOptions) -> Value {
    if options.strings_as_bytes {
        Value::Bytes(Vec::new())
    } else {
        Value::String(String::new())
    }
}

fn decode(data: Vec<u8>, options: &ColumnOptions) -> Value {
    if options.strings_as_bytes {
        return Value::Bytes(data);
    }
    match String::from_utf8(data) {
        Ok(s) => Value::String(s),
        Err(e) => Value::Bytes(e.into_bytes()),
    }
}

/// Variable-length strings: varint length followed by the raw bytes.
pub struct ColumnString {
    type_: Type,
    options: ColumnOptions,
}

impl ColumnString {
    pub fn new(options: ColumnOptions) -> Self {
        Self { type_: Type::Simple(TypeCode::String), options }
    }
}

#[async_trait]
impl Column for ColumnString {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        empty_string(&self.options)
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        reader.read_strings(rows, !self.options.strings_as_bytes).await
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            let data = item
                .as_bytes()
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            buffer_utils::write_binary(buffer, data);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Strings of exactly `size` bytes, zero-padded on write. Trailing zero
/// bytes are stripped on read.
pub struct ColumnFixedString {
    type_: Type,
    size: usize,
    options: ColumnOptions,
}

impl ColumnFixedString {
    pub fn new(size: usize, options: ColumnOptions) -> Self {
        Self { type_: Type::FixedString { size }, size, options }
    }

    pub fn fixed_size(&self) -> usize {
        self.size
    }
}

#[async_trait]
impl Column for ColumnFixedString {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        empty_string(&self.options)
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let raw = reader.read(rows * self.size).await?;
        Ok(raw
            .chunks_exact(self.size)
            .map(|chunk| {
                let end = chunk
                    .iter()
                    .rposition(|b| *b != 0)
                    .map_or(0, |pos| pos + 1);
                decode(chunk[..end].to_vec(), &self.options)
            })
            .collect())
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        buffer.reserve(items.len() * self.size);
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            let data = item
                .as_bytes()
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            if data.len() > self.size {
                return Err(Error::TooLargeStringSize {
                    column: String::new(),
                    size: data.len(),
                    max: self.size,
                });
            }
            buffer.put_slice(data);
            buffer.put_bytes(0, self.size - data.len());
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
