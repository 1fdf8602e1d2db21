//! # ClickHouse Type System
//!
//! Column types as they appear in block headers, e.g.
//! `LowCardinality(Nullable(String))`. A [`Type`] is produced by
//! [`parse_type`] and consumed by [`crate::column::create_column`], which
//! turns it into the handler that encodes and decodes values of that type.
//!
//! ## ClickHouse Documentation References
//!
//! - [Integer Types](https://clickhouse.com/docs/en/sql-reference/data-types/int-uint)
//!   - Int8..Int256, UInt8..UInt256
//! - [Decimal Types](https://clickhouse.com/docs/en/sql-reference/data-types/decimal)
//!   - Decimal(P, S), Decimal32/64/128/256(S)
//! - [Date and time](https://clickhouse.com/docs/en/sql-reference/data-types/datetime64)
//!   - Date, Date32, DateTime, DateTime64
//! - [Compound types](https://clickhouse.com/docs/en/sql-reference/data-types/tuple)
//!   - Array, Tuple, Map, Nested
//! - [Geo](https://clickhouse.com/docs/en/sql-reference/data-types/geo)
//!   - Point, Ring, Polygon, MultiPolygon
//!
//! ## Aliases
//!
//! Some names never reach the column layer because they are spelled out
//! in terms of other types while parsing:
//!
//! - `Point` is `Tuple(Float64, Float64)`, `Ring` is `Array(Point)`,
//!   `Polygon` is `Array(Ring)`, `MultiPolygon` is `Array(Polygon)`
//! - `Nested(a T, b U)` is `Array(Tuple(a T, b U))`
//! - `SimpleAggregateFunction(f, T)` is `T`
//! - `Interval*` types are `Int64`
//! - `DecimalN(S)` is `Decimal(P, S)` with the widest precision of `N` bits

mod parser;

pub use parser::parse_type;

use std::fmt;

/// Type code enumeration matching ClickHouse types
///
/// Each variant represents a base type in ClickHouse. For parametric types
/// (like Array, Nullable, etc.), see the [`Type`] enum which includes
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// Type of `NULL` literals; every value is NULL.
    Nothing,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,
    Float32,
    Float64,
    String,
    FixedString,
    /// Days since 1970-01-01 stored as UInt16.
    Date,
    /// Days since 1970-01-01 stored as Int32.
    Date32,
    DateTime,
    DateTime64,
    Decimal,
    Enum8,
    Enum16,
    UUID,
    IPv4,
    IPv6,
    Array,
    Nullable,
    Tuple,
    LowCardinality,
    Map,
    /// Semi-structured object, shipped with its concrete type per block.
    Json,
}

impl TypeCode {
    /// Returns the ClickHouse type name string for this type code.
    pub fn name(&self) -> &'static str {
        match self {
            TypeCode::Nothing => "Nothing",
            TypeCode::Bool => "Bool",
            TypeCode::Int8 => "Int8",
            TypeCode::Int16 => "Int16",
            TypeCode::Int32 => "Int32",
            TypeCode::Int64 => "Int64",
            TypeCode::Int128 => "Int128",
            TypeCode::Int256 => "Int256",
            TypeCode::UInt8 => "UInt8",
            TypeCode::UInt16 => "UInt16",
            TypeCode::UInt32 => "UInt32",
            TypeCode::UInt64 => "UInt64",
            TypeCode::UInt128 => "UInt128",
            TypeCode::UInt256 => "UInt256",
            TypeCode::Float32 => "Float32",
            TypeCode::Float64 => "Float64",
            TypeCode::String => "String",
            TypeCode::FixedString => "FixedString",
            TypeCode::Date => "Date",
            TypeCode::Date32 => "Date32",
            TypeCode::DateTime => "DateTime",
            TypeCode::DateTime64 => "DateTime64",
            TypeCode::Decimal => "Decimal",
            TypeCode::Enum8 => "Enum8",
            TypeCode::Enum16 => "Enum16",
            TypeCode::UUID => "UUID",
            TypeCode::IPv4 => "IPv4",
            TypeCode::IPv6 => "IPv6",
            TypeCode::Array => "Array",
            TypeCode::Nullable => "Nullable",
            TypeCode::Tuple => "Tuple",
            TypeCode::LowCardinality => "LowCardinality",
            TypeCode::Map => "Map",
            TypeCode::Json => "JSON",
        }
    }
}

/// Enum item for Enum8/Enum16 types, mapping a name to its integer value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub name: String,
    pub value: i16,
}

/// ClickHouse type definition, representing both simple and parametric types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// A non-parametric type identified by its [`TypeCode`].
    Simple(TypeCode),
    FixedString {
        size: usize,
    },
    DateTime {
        timezone: Option<String>,
    },
    DateTime64 {
        /// Number of sub-second decimal digits (0 to 9).
        precision: u32,
        timezone: Option<String>,
    },
    Decimal {
        precision: u32,
        scale: u32,
    },
    Enum8 {
        items: Vec<EnumItem>,
    },
    Enum16 {
        items: Vec<EnumItem>,
    },
    Array {
        item_type: Box<Type>,
    },
    Nullable {
        nested_type: Box<Type>,
    },
    /// `names` is empty for positional tuples, otherwise it holds one name
    /// per element.
    Tuple {
        item_types: Vec<Type>,
        names: Vec<String>,
    },
    LowCardinality {
        nested_type: Box<Type>,
    },
    Map {
        key_type: Box<Type>,
        value_type: Box<Type>,
    },
    Json,
}

impl Type {
    /// Parse a type spec such as `Array(Nullable(Int32))`.
    pub fn parse(spec: &str) -> crate::Result<Type> {
        parse_type(spec)
    }

    /// Returns the [`TypeCode`] for this type.
    pub fn code(&self) -> TypeCode {
        match self {
            Type::Simple(code) => *code,
            Type::FixedString { .. } => TypeCode::FixedString,
            Type::DateTime { .. } => TypeCode::DateTime,
            Type::DateTime64 { .. } => TypeCode::DateTime64,
            Type::Decimal { .. } => TypeCode::Decimal,
            Type::Enum8 { .. } => TypeCode::Enum8,
            Type::Enum16 { .. } => TypeCode::Enum16,
            Type::Array { .. } => TypeCode::Array,
            Type::Nullable { .. } => TypeCode::Nullable,
            Type::Tuple { .. } => TypeCode::Tuple,
            Type::LowCardinality { .. } => TypeCode::LowCardinality,
            Type::Map { .. } => TypeCode::Map,
            Type::Json => TypeCode::Json,
        }
    }

    /// Returns the full ClickHouse type name string, including parameters.
    pub fn name(&self) -> String {
        match self {
            Type::Simple(code) => code.name().to_string(),
            Type::FixedString { size } => format!("FixedString({})", size),
            Type::DateTime { timezone: None } => "DateTime".to_string(),
            Type::DateTime { timezone: Some(tz) } => {
                format!("DateTime('{}')", tz)
            }
            Type::DateTime64 { precision, timezone: None } => {
                format!("DateTime64({})", precision)
            }
            Type::DateTime64 { precision, timezone: Some(tz) } => {
                format!("DateTime64({}, '{}')", precision, tz)
            }
            Type::Decimal { precision, scale } => {
                format!("Decimal({}, {})", precision, scale)
            }
            Type::Enum8 { items } => {
                format!("Enum8({})", format_enum_items(items))
            }
            Type::Enum16 { items } => {
                format!("Enum16({})", format_enum_items(items))
            }
            Type::Array { item_type } => {
                format!("Array({})", item_type.name())
            }
            Type::Nullable { nested_type } => {
                format!("Nullable({})", nested_type.name())
            }
            Type::Tuple { item_types, names } => {
                let types: Vec<String> = if names.is_empty() {
                    item_types.iter().map(|t| t.name()).collect()
                } else {
                    names
                        .iter()
                        .zip(item_types)
                        .map(|(n, t)| format!("{} {}", n, t.name()))
                        .collect()
                };
                format!("Tuple({})", types.join(", "))
            }
            Type::LowCardinality { nested_type } => {
                format!("LowCardinality({})", nested_type.name())
            }
            Type::Map { key_type, value_type } => {
                format!("Map({}, {})", key_type.name(), value_type.name())
            }
            Type::Json => "Object('json')".to_string(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable { .. })
    }

    pub fn int8() -> Self {
        Type::Simple(TypeCode::Int8)
    }

    pub fn int32() -> Self {
        Type::Simple(TypeCode::Int32)
    }

    pub fn int64() -> Self {
        Type::Simple(TypeCode::Int64)
    }

    pub fn uint8() -> Self {
        Type::Simple(TypeCode::UInt8)
    }

    pub fn uint64() -> Self {
        Type::Simple(TypeCode::UInt64)
    }

    pub fn float64() -> Self {
        Type::Simple(TypeCode::Float64)
    }

    pub fn string() -> Self {
        Type::Simple(TypeCode::String)
    }

    pub fn array(item_type: Type) -> Self {
        Type::Array { item_type: Box::new(item_type) }
    }

    pub fn nullable(nested_type: Type) -> Self {
        Type::Nullable { nested_type: Box::new(nested_type) }
    }

    pub fn low_cardinality(nested_type: Type) -> Self {
        Type::LowCardinality { nested_type: Box::new(nested_type) }
    }

    pub fn tuple(item_types: Vec<Type>) -> Self {
        Type::Tuple { item_types, names: Vec::new() }
    }

    pub fn map(key_type: Type, value_type: Type) -> Self {
        Type::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
        }
    }

    /// `Point`, i.e. `Tuple(Float64, Float64)`.
    pub fn point() -> Self {
        Type::tuple(vec![Type::float64(), Type::float64()])
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

fn format_enum_items(items: &[EnumItem]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "'{}' = {}",
                item.name.replace('\\', "\\\\").replace('\'', "\\'"),
                item.value
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}
