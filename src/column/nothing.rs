use std::any::Any;

use async_trait::async_trait;
use bytes::{
    BufMut,
    BytesMut,
};

use super::{
    Column,
    Value,
};
use crate::io::BufferedReader;
use crate::types::{
    Type,
    TypeCode,
};
use crate::Result;

/// Type of `NULL` literals: one placeholder byte per row, always read as
/// NULL. Any value may be written.
pub struct ColumnNothing {
    type_: Type,
}

impl ColumnNothing {
    pub fn new() -> Self {
        Self { type_: Type::Simple(TypeCode::Nothing) }
    }
}

impl Default for ColumnNothing {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Column for ColumnNothing {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Null
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        reader.read(rows).await?;
        Ok(vec![Value::Null; rows])
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        buffer.put_bytes(0, items.len());
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
    use super::*;

    #[tokio::test]
    async fn test_nothing() {
        assert_eq!(&encode("Nothing", &[Value::Null, Value::Int8(1)])[..], &[0, 0]);
        assert_eq!(
            roundtrip("Nothing", &[Value::Null, Value::Null]).await,
            vec![Value::Null, Value::Null]
        );
        assert_eq!(
            roundtrip("Nullable(Nothing)", &[Value::Null]).await,
            vec![Value::Null]
        );
    }
}
