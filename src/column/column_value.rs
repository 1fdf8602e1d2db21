//! Value - a single cell read from or written to a column.
//!
//! Column handlers decode into and encode from `Value`; each handler
//! documents which variants it accepts on write. Integer variants are
//! interchangeable on write as long as the number fits the target width.

use std::net::{
    Ipv4Addr,
    Ipv6Addr,
};

use chrono::{
    DateTime,
    NaiveDate,
    Utc,
};
use uuid::Uuid;

use super::decimal::Decimal;
use super::wide::{
    I256,
    U256,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Int256(I256),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    UInt256(U256),
    Float32(f32),
    Float64(f64),
    String(String),
    /// String data that is not valid UTF-8, or strings read with
    /// `strings_as_bytes`.
    Bytes(Vec<u8>),
    Date(NaiveDate),
    /// DateTime and DateTime64 values, as UTC instants.
    DateTime(DateTime<Utc>),
    Decimal(Decimal),
    Uuid(Uuid),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// JSON objects: named tuples of a JSON column, in field order.
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Any integer (or bool) as i128, if it fits.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::Bool(v) => Some(v as i128),
            Value::Int8(v) => Some(v as i128),
            Value::Int16(v) => Some(v as i128),
            Value::Int32(v) => Some(v as i128),
            Value::Int64(v) => Some(v as i128),
            Value::Int128(v) => Some(v),
            Value::Int256(v) => v.to_i128(),
            Value::UInt8(v) => Some(v as i128),
            Value::UInt16(v) => Some(v as i128),
            Value::UInt32(v) => Some(v as i128),
            Value::UInt64(v) => Some(v as i128),
            Value::UInt128(v) => i128::try_from(v).ok(),
            Value::UInt256(v) => v.to_u128().and_then(|v| i128::try_from(v).ok()),
            _ => None,
        }
    }

    /// Any non-negative integer (or bool) as u128, if it fits.
    pub fn as_u128(&self) -> Option<u128> {
        match *self {
            Value::UInt128(v) => Some(v),
            Value::UInt256(v) => v.to_u128(),
            _ => self.as_i128().and_then(|v| u128::try_from(v).ok()),
        }
    }

    /// Any number as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// String or raw bytes as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Elements of an array or tuple.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    I256 => Int256,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    u128 => UInt128,
    U256 => UInt256,
    f32 => Float32,
    f64 => Float64,
    String => String,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
    Decimal => Decimal,
    Uuid => Uuid,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
    Vec<Value> => Array,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_views() {
        assert_eq!(Value::UInt8(200).as_i128(), Some(200));
        assert_eq!(Value::Int8(-1).as_u128(), None);
        assert_eq!(Value::UInt128(u128::MAX).as_i128(), None);
        assert_eq!(Value::UInt128(u128::MAX).as_u128(), Some(u128::MAX));
        assert_eq!(Value::Bool(true).as_i128(), Some(1));
        assert_eq!(Value::String("1".into()).as_i128(), None);
        assert_eq!(Value::Int32(3).as_f64(), Some(3.0));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from("a"), Value::String("a".into()));
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some(5u16)), Value::UInt16(5));
        assert_eq!(
            Value::from(vec![Value::from(1i8)]),
            Value::Array(vec![Value::Int8(1)])
        );
    }
}
