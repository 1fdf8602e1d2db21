//! # Column Module
//!
//! Handlers that encode and decode the payload of one column of a block.
//! A handler is created from a [`Type`] by [`create_column`] and is
//! stateless: the same handler can decode any number of blocks and encode
//! any number of value slices.
//!
//! Every handler reads and writes exactly as many items as the block has
//! rows. Composite handlers delegate to the handlers of their element types,
//! including the *state prefix* that some types (LowCardinality, JSON) put
//! in front of all data of the column.
//!
//! ## ClickHouse Documentation
//!
//! - [Data Types Overview](https://clickhouse.com/docs/en/sql-reference/data-types)
//! - [Nullable Type](https://clickhouse.com/docs/en/sql-reference/data-types/nullable)
//! - [Array Type](https://clickhouse.com/docs/en/sql-reference/data-types/array)
//! - [LowCardinality Type](https://clickhouse.com/docs/en/sql-reference/data-types/lowcardinality)
//!
//! ## Type Nesting Restrictions
//!
//! | Invalid Nesting | Use instead |
//! |----------------|-------------|
//! | `Nullable(Array(...))` | `Array(Nullable(...))` |
//! | `Nullable(LowCardinality(...))` | `LowCardinality(Nullable(...))` |
//!
//! The server rejects these, so the handlers do not special-case them.

pub mod array;
pub mod column_value;
pub mod date;
pub mod decimal;
pub mod enum_column;
pub mod ipv4;
pub mod ipv6;
pub mod json;
pub mod lowcardinality;
pub mod map;
pub mod nothing;
pub mod nullable;
pub mod numeric;
pub mod sparse;
pub mod string;
pub mod tuple;
pub mod uuid;
pub mod wide;

pub use array::ColumnArray;
pub use column_value::Value;
pub use date::{
    ColumnDate,
    ColumnDate32,
    ColumnDateTime,
    ColumnDateTime64,
};
pub use decimal::{
    ColumnDecimal,
    Decimal,
};
pub use enum_column::ColumnEnum;
pub use ipv4::ColumnIpv4;
pub use ipv6::ColumnIpv6;
pub use json::ColumnJson;
pub use lowcardinality::ColumnLowCardinality;
pub use map::ColumnMap;
pub use nothing::ColumnNothing;
pub use nullable::ColumnNullable;
pub use numeric::*;
pub use string::{
    ColumnFixedString,
    ColumnString,
};
pub use tuple::ColumnTuple;
pub use uuid::ColumnUuid;
pub use wide::{
    I256,
    U256,
};

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;

use crate::io::BufferedReader;
use crate::types::{
    Type,
    TypeCode,
};
use crate::{
    Error,
    Result,
};

/// Reference-counted handle to a column handler.
pub type ColumnRef = Arc<dyn Column>;

/// Client settings that change how values are encoded or decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnOptions {
    /// Return String columns as raw bytes instead of decoding UTF-8.
    pub strings_as_bytes: bool,
    /// Write the type's default value for NULLs in non-nullable columns
    /// instead of failing.
    pub input_null_as_default: bool,
}

#[async_trait]
pub trait Column: Send + Sync {
    fn column_type(&self) -> &Type;

    /// Zero-equivalent of the type, written in place of NULLs.
    fn null_value(&self) -> Value;

    fn is_nullable(&self) -> bool {
        false
    }

    async fn read_state_prefix(
        &self,
        _reader: &mut BufferedReader<'_>,
    ) -> Result<()> {
        Ok(())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>>;

    fn write_state_prefix(&self, _buffer: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn write_items(&self, items: &[Value], buffer: &mut BytesMut)
        -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

/// Resolve a NULL handed to a non-nullable column: the type's default when
/// `input_null_as_default` is set, a type mismatch otherwise.
pub(crate) fn resolve_null<'a>(
    item: &'a Value,
    default: &'a Value,
    options: &ColumnOptions,
    column_type: &Type,
) -> Result<&'a Value> {
    match item {
        Value::Null if options.input_null_as_default => Ok(default),
        Value::Null => Err(Error::mismatch(column_type.name(), item)),
        other => Ok(other),
    }
}

/// Create the handler for a parsed type.
pub fn create_column(ty: &Type, options: ColumnOptions) -> Result<ColumnRef> {
    let column: ColumnRef = match ty {
        Type::Simple(code) => match code {
            TypeCode::Nothing => Arc::new(ColumnNothing::new()),
            TypeCode::Bool => Arc::new(ColumnBool::new(ty.clone(), options)),
            TypeCode::Int8 => Arc::new(ColumnInt8::new(ty.clone(), options)),
            TypeCode::Int16 => Arc::new(ColumnInt16::new(ty.clone(), options)),
            TypeCode::Int32 => Arc::new(ColumnInt32::new(ty.clone(), options)),
            TypeCode::Int64 => Arc::new(ColumnInt64::new(ty.clone(), options)),
            TypeCode::Int128 => {
                Arc::new(ColumnInt128::new(ty.clone(), options))
            }
            TypeCode::Int256 => {
                Arc::new(ColumnInt256::new(ty.clone(), options))
            }
            TypeCode::UInt8 => Arc::new(ColumnUInt8::new(ty.clone(), options)),
            TypeCode::UInt16 => {
                Arc::new(ColumnUInt16::new(ty.clone(), options))
            }
            TypeCode::UInt32 => {
                Arc::new(ColumnUInt32::new(ty.clone(), options))
            }
            TypeCode::UInt64 => {
                Arc::new(ColumnUInt64::new(ty.clone(), options))
            }
            TypeCode::UInt128 => {
                Arc::new(ColumnUInt128::new(ty.clone(), options))
            }
            TypeCode::UInt256 => {
                Arc::new(ColumnUInt256::new(ty.clone(), options))
            }
            TypeCode::Float32 => {
                Arc::new(ColumnFloat32::new(ty.clone(), options))
            }
            TypeCode::Float64 => {
                Arc::new(ColumnFloat64::new(ty.clone(), options))
            }
            TypeCode::String => Arc::new(ColumnString::new(options)),
            TypeCode::Date => Arc::new(ColumnDate::new(options)),
            TypeCode::Date32 => Arc::new(ColumnDate32::new(options)),
            TypeCode::UUID => Arc::new(ColumnUuid::new(options)),
            TypeCode::IPv4 => Arc::new(ColumnIpv4::new(options)),
            TypeCode::IPv6 => Arc::new(ColumnIpv6::new(options)),
            other => {
                return Err(Error::UnknownType(other.name().to_string()))
            }
        },
        Type::FixedString { size } => {
            Arc::new(ColumnFixedString::new(*size, options))
        }
        Type::DateTime { .. } => {
            Arc::new(ColumnDateTime::new(ty.clone(), options))
        }
        Type::DateTime64 { precision, .. } => {
            Arc::new(ColumnDateTime64::new(ty.clone(), *precision, options))
        }
        Type::Decimal { precision, scale } => {
            Arc::new(ColumnDecimal::new(*precision, *scale, options))
        }
        Type::Enum8 { items } | Type::Enum16 { items } => {
            Arc::new(ColumnEnum::new(ty.clone(), items.clone(), options))
        }
        Type::Array { item_type } => Arc::new(ColumnArray::new(
            ty.clone(),
            create_column(item_type, options)?,
            options,
        )),
        Type::Nullable { nested_type } => Arc::new(ColumnNullable::new(
            ty.clone(),
            create_column(nested_type, options)?,
        )),
        Type::Tuple { item_types, .. } => {
            let columns = item_types
                .iter()
                .map(|t| create_column(t, options))
                .collect::<Result<Vec<_>>>()?;
            Arc::new(ColumnTuple::new(ty.clone(), columns, options))
        }
        Type::LowCardinality { nested_type } => {
            Arc::new(ColumnLowCardinality::new(
                ty.clone(),
                nested_type,
                options,
            )?)
        }
        Type::Map { key_type, value_type } => Arc::new(ColumnMap::new(
            ty.clone(),
            create_column(key_type, options)?,
            create_column(value_type, options)?,
            options,
        )),
        Type::Json => Arc::new(ColumnJson::new(options)),
    };
    Ok(column)
}

/// Parse a type spec and create its handler.
pub fn column_by_spec(spec: &str, options: ColumnOptions) -> Result<ColumnRef> {
    create_column(&Type::parse(spec)?, options)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    /// Encode `values` with the handler for `spec`, prefix included.
    pub fn encode(spec: &str, values: &[Value]) -> BytesMut {
        let column = column_by_spec(spec, ColumnOptions::default()).unwrap();
        let mut buf = BytesMut::new();
        column.write_state_prefix(&mut buf).unwrap();
        column.write_items(values, &mut buf).unwrap();
        buf
    }

    /// Decode `rows` items of `spec`, asserting the input is consumed.
    pub async fn decode(spec: &str, data: &[u8], rows: usize) -> Vec<Value> {
        let column = column_by_spec(spec, ColumnOptions::default()).unwrap();
        let mut reader = BufferedReader::from_bytes(data.to_vec());
        column.read_state_prefix(&mut reader).await.unwrap();
        let values = column.read_items(&mut reader, rows).await.unwrap();
        assert_eq!(reader.remaining_buffered(), 0, "trailing bytes");
        values
    }

    pub async fn roundtrip(spec: &str, values: &[Value]) -> Vec<Value> {
        let encoded = encode(spec, values);
        decode(spec, &encoded, values.len()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_column_for_every_family() {
        for spec in [
            "Nothing",
            "Bool",
            "Int256",
            "UInt128",
            "Float32",
            "String",
            "FixedString(4)",
            "Date",
            "Date32",
            "DateTime('UTC')",
            "DateTime64(3)",
            "Decimal(38, 10)",
            "Enum16('a' = 1)",
            "UUID",
            "IPv4",
            "IPv6",
            "Array(Array(Int32))",
            "Nullable(String)",
            "Tuple(a Int8, b String)",
            "LowCardinality(Nullable(String))",
            "Map(String, UInt64)",
            "Nested(a Int8)",
            "MultiPolygon",
            "Object('json')",
        ] {
            let column = column_by_spec(spec, ColumnOptions::default())
                .unwrap_or_else(|e| panic!("{}: {}", spec, e));
            assert_eq!(
                column.column_type(),
                &Type::parse(spec).unwrap(),
                "{}",
                spec
            );
        }
    }

    #[test]
    fn test_unknown_type() {
        assert!(matches!(
            column_by_spec("Foo(1)", ColumnOptions::default()),
            Err(Error::UnknownType(_))
        ));
    }

    #[test]
    fn test_resolve_null() {
        let default = Value::Int32(0);
        let ty = Type::int32();
        let strict = ColumnOptions::default();
        let lenient =
            ColumnOptions { input_null_as_default: true, ..strict };

        assert!(matches!(
            resolve_null(&Value::Null, &default, &strict, &ty),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(
            resolve_null(&Value::Null, &default, &lenient, &ty).unwrap(),
            &Value::Int32(0)
        );
        assert_eq!(
            resolve_null(&Value::Int32(5), &default, &strict, &ty).unwrap(),
            &Value::Int32(5)
        );
    }
}
