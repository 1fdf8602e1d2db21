use std::any::Any;

use async_trait::async_trait;
use bytes::BytesMut;
use uuid::Uuid;

use super::numeric::ColumnVector;
use super::{
    resolve_null,
    Column,
    ColumnOptions,
    Value,
};
use crate::io::BufferedReader;
use crate::types::{
    Type,
    TypeCode,
};
use crate::{
    Error,
    Result,
};

/// UUID stored as two little-endian u64 halves, most significant half
/// first. Strings in any format `uuid` parses are accepted on write.
pub struct ColumnUuid {
    type_: Type,
    options: ColumnOptions,
}

impl ColumnUuid {
    pub fn new(options: ColumnOptions) -> Self {
        Self { type_: Type::Simple(TypeCode::UUID), options }
    }
}

#[async_trait]
impl Column for ColumnUuid {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Uuid(Uuid::nil())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let halves = ColumnVector::<u64>::read_raw(reader, rows * 2).await?;
        Ok(halves
            .chunks_exact(2)
            .map(|pair| Value::Uuid(Uuid::from_u64_pair(pair[0], pair[1])))
            .collect())
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        let mut halves = Vec::with_capacity(items.len() * 2);
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            let uuid = match item {
                Value::Uuid(u) => Some(*u),
                Value::String(s) => Uuid::parse_str(s).ok(),
                _ => None,
            }
            .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            let (hi, lo) = uuid.as_u64_pair();
            halves.push(hi);
            halves.push(lo);
        }
        ColumnVector::<u64>::write_raw(&halves, buffer);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
