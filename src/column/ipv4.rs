use std::any::Any;
use std::net::Ipv4Addr;

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
    Type,
    TypeCode,
};
use crate::{
    Error,
    Result,
};

/// IPv4 addresses as little-endian UInt32. Dotted strings and integers are
/// accepted on write.
pub struct ColumnIpv4 {
    type_: Type,
    options: ColumnOptions,
}

impl ColumnIpv4 {
    pub fn new(options: ColumnOptions) -> Self {
        Self { type_: Type::Simple(TypeCode::IPv4), options }
    }
}

#[async_trait]
impl Column for ColumnIpv4 {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Ipv4(Ipv4Addr::UNSPECIFIED)
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        Ok(ColumnVector::<u32>::read_raw(reader, rows)
            .await?
            .into_iter()
            .map(|raw| Value::Ipv4(Ipv4Addr::from(raw)))
            .collect())
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
            let addr = match item {
                Value::Ipv4(addr) => Some(*addr),
                Value::String(s) => s.parse().ok(),
                other => other
                    .as_u128()
                    .and_then(|v| u32::try_from(v).ok())
                    .map(Ipv4Addr::from),
            }
            .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            raw.push(u32::from(addr));
        }
        ColumnVector::<u32>::write_raw(&raw, buffer);
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
    async fn test_ipv4() {
        let addr = Ipv4Addr::new(192, 168, 1, 2);
        assert_eq!(&encode("IPv4", &[Value::Ipv4(addr)])[..], &[2, 1, 168, 192]);
        let out = roundtrip(
            "IPv4",
            &[Value::Ipv4(addr), Value::from("10.0.0.1"), Value::UInt32(1)],
        )
        .await;
        assert_eq!(
            out,
            vec![
                Value::Ipv4(addr),
                Value::Ipv4(Ipv4Addr::new(10, 0, 0, 1)),
                Value::Ipv4(Ipv4Addr::new(0, 0, 0, 1)),
            ]
        );
    }

    #[test]
    fn test_rejects_ipv6_text() {
        let column = ColumnIpv4::new(ColumnOptions::default());
        let mut buf = BytesMut::new();
        assert!(column.write_items(&[Value::from("::1")], &mut buf).is_err());
    }
}
