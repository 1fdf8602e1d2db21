use std::any::Any;
use std::net::Ipv6Addr;

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
use crate::io::BufferedReader;
use crate::types::{
    Type,
    TypeCode,
};
use crate::{
    Error,
    Result,
};

/// IPv6 addresses as 16 bytes in network order. IPv4 addresses are written
/// in their IPv4-mapped form.
pub struct ColumnIpv6 {
    type_: Type,
    options: ColumnOptions,
}

impl ColumnIpv6 {
    pub fn new(options: ColumnOptions) -> Self {
        Self { type_: Type::Simple(TypeCode::IPv6), options }
    }

    fn to_addr(item: &Value) -> Option<Ipv6Addr> {
        match item {
            Value::Ipv6(addr) => Some(*addr),
            Value::Ipv4(addr) => Some(addr.to_ipv6_mapped()),
            Value::String(s) => s.parse().ok(),
            Value::Bytes(b) => {
                <[u8; 16]>::try_from(b.as_slice()).ok().map(Ipv6Addr::from)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl Column for ColumnIpv6 {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Ipv6(Ipv6Addr::UNSPECIFIED)
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let raw = reader.read(rows * 16).await?;
        Ok(raw
            .chunks_exact(16)
            .map(|chunk| {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(chunk);
                Value::Ipv6(Ipv6Addr::from(octets))
            })
            .collect())
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        buffer.reserve(items.len() * 16);
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            let addr = Self::to_addr(item)
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            buffer.put_slice(&addr.octets());
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
