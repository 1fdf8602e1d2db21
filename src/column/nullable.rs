use std::any::Any;

use async_trait::async_trait;
use bytes::{
    BufMut,
    BytesMut,
};

use super::{
    Column,
    ColumnRef,
    Value,
};
use crate::io::BufferedReader;
use crate::types::Type;
use crate::Result;

/// Nullable(T): a byte per row (1 = NULL) followed by the nested column,
/// where NULL rows hold the nested type's default.
pub struct ColumnNullable {
    type_: Type,
    nested: ColumnRef,
}

impl ColumnNullable {
    pub fn new(type_: Type, nested: ColumnRef) -> Self {
        Self { type_, nested }
    }

    pub fn nested(&self) -> &ColumnRef {
        &self.nested
    }
}

#[async_trait]
impl Column for ColumnNullable {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Null
    }

    fn is_nullable(&self) -> bool {
        true
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
        let nulls = reader.read(rows).await?.into_owned();
        let mut items = self.nested.read_items(reader, rows).await?;
        for (item, is_null) in items.iter_mut().zip(nulls) {
            if is_null != 0 {
                *item = Value::Null;
            }
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
        buffer.reserve(items.len());
        for item in items {
            buffer.put_u8(item.is_null() as u8);
        }
        if !items.iter().any(Value::is_null) {
            return self.nested.write_items(items, buffer);
        }
        let placeholder = self.nested.null_value();
        let filled: Vec<Value> = items
            .iter()
            .map(|item| {
                if item.is_null() {
                    placeholder.clone()
                } else {
                    item.clone()
                }
            })
            .collect();
        self.nested.write_items(&filled, buffer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
