use std::any::Any;

use async_trait::async_trait;
use bytes::BytesMut;

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

/// Tuple(T1, T2, ...): each element column in turn, all with the block's
/// row count. Rows are `Value::Tuple`; a named tuple also accepts a
/// `Value::Object` whose keys match the element names on write.
pub struct ColumnTuple {
    type_: Type,
    columns: Vec<ColumnRef>,
    options: ColumnOptions,
}

impl ColumnTuple {
    pub fn new(type_: Type, columns: Vec<ColumnRef>, options: ColumnOptions) -> Self {
        Self { type_, columns, options }
    }

    pub fn element_names(&self) -> &[String] {
        match &self.type_ {
            Type::Tuple { names, .. } => names,
            _ => &[],
        }
    }

    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Elements of one row in column order.
    fn elements<'v>(&self, item: &'v Value) -> Option<Vec<&'v Value>> {
        match item {
            Value::Tuple(values) | Value::Array(values)
                if values.len() == self.columns.len() =>
            {
                Some(values.iter().collect())
            }
            Value::Object(fields) if fields.len() == self.columns.len() => self
                .element_names()
                .iter()
                .map(|name| {
                    fields.iter().find(|(key, _)| key == name).map(|(_, v)| v)
                })
                .collect(),
            _ => None,
        }
    }
}

#[async_trait]
impl Column for ColumnTuple {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Tuple(self.columns.iter().map(|c| c.null_value()).collect())
    }

    async fn read_state_prefix(
        &self,
        reader: &mut BufferedReader<'_>,
    ) -> Result<()> {
        for column in &self.columns {
            column.read_state_prefix(reader).await?;
        }
        Ok(())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let mut rows_out: Vec<Vec<Value>> =
            (0..rows).map(|_| Vec::with_capacity(self.columns.len())).collect();
        for column in &self.columns {
            let values = column.read_items(reader, rows).await?;
            for (row, value) in rows_out.iter_mut().zip(values) {
                row.push(value);
            }
        }
        Ok(rows_out.into_iter().map(Value::Tuple).collect())
    }

    fn write_state_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        for column in &self.columns {
            column.write_state_prefix(buffer)?;
        }
        Ok(())
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        let mut transposed: Vec<Vec<Value>> = self
            .columns
            .iter()
            .map(|_| Vec::with_capacity(items.len()))
            .collect();
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            let elements = self
                .elements(item)
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            for (column, element) in transposed.iter_mut().zip(elements) {
                column.push(element.clone());
            }
        }
        for (column, values) in self.columns.iter().zip(&transposed) {
            column.write_items(values, buffer)?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
