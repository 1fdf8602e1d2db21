use std::any::Any;
use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};

use super::wide::{
    I256,
    U256,
};
use super::{
    resolve_null,
    Column,
    ColumnOptions,
    Value,
};
use crate::io::BufferedReader;
use crate::types::Type;
use crate::{
    Error,
    Result,
};

/// Fixed-width little-endian scalar stored by [`ColumnVector`].
pub trait FixedSize: Sized + Copy + Default + Send + Sync + 'static {
    const SIZE: usize;

    /// Decode one value; the caller guarantees `SIZE` bytes are available.
    fn read_from(buffer: &mut &[u8]) -> Self;
    fn write_to(&self, buffer: &mut BytesMut);
    fn into_value(self) -> Value;
    /// Convert a value supplied for writing; `None` when it doesn't fit.
    fn from_value(value: &Value) -> Option<Self>;
}

macro_rules! impl_fixed_int {
    ($type:ty, $get:ident, $put:ident, $variant:ident, $view:ident) => {
        impl FixedSize for $type {
            const SIZE: usize = std::mem::size_of::<$type>();

            fn read_from(buffer: &mut &[u8]) -> Self {
                buffer.$get()
            }

            fn write_to(&self, buffer: &mut BytesMut) {
                buffer.$put(*self);
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                value.$view().and_then(|v| <$type>::try_from(v).ok())
            }
        }
    };
}

impl_fixed_int!(i8, get_i8, put_i8, Int8, as_i128);
impl_fixed_int!(i16, get_i16_le, put_i16_le, Int16, as_i128);
impl_fixed_int!(i32, get_i32_le, put_i32_le, Int32, as_i128);
impl_fixed_int!(i64, get_i64_le, put_i64_le, Int64, as_i128);
impl_fixed_int!(i128, get_i128_le, put_i128_le, Int128, as_i128);
impl_fixed_int!(u8, get_u8, put_u8, UInt8, as_u128);
impl_fixed_int!(u16, get_u16_le, put_u16_le, UInt16, as_u128);
impl_fixed_int!(u32, get_u32_le, put_u32_le, UInt32, as_u128);
impl_fixed_int!(u64, get_u64_le, put_u64_le, UInt64, as_u128);
impl_fixed_int!(u128, get_u128_le, put_u128_le, UInt128, as_u128);

impl FixedSize for f32 {
    const SIZE: usize = 4;

    fn read_from(buffer: &mut &[u8]) -> Self {
        buffer.get_f32_le()
    }

    fn write_to(&self, buffer: &mut BytesMut) {
        buffer.put_f32_le(*self);
    }

    fn into_value(self) -> Value {
        Value::Float32(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }
}

impl FixedSize for f64 {
    const SIZE: usize = 8;

    fn read_from(buffer: &mut &[u8]) -> Self {
        buffer.get_f64_le()
    }

    fn write_to(&self, buffer: &mut BytesMut) {
        buffer.put_f64_le(*self);
    }

    fn into_value(self) -> Value {
        Value::Float64(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl FixedSize for bool {
    const SIZE: usize = 1;

    fn read_from(buffer: &mut &[u8]) -> Self {
        buffer.get_u8() != 0
    }

    fn write_to(&self, buffer: &mut BytesMut) {
        buffer.put_u8(*self as u8);
    }

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i128().map(|v| v != 0)
    }
}

fn read_wide(buffer: &mut &[u8]) -> [u8; 32] {
    let mut raw = [0u8; 32];
    buffer.copy_to_slice(&mut raw);
    raw
}

impl FixedSize for I256 {
    const SIZE: usize = 32;

    fn read_from(buffer: &mut &[u8]) -> Self {
        I256::from_le_bytes(read_wide(buffer))
    }

    fn write_to(&self, buffer: &mut BytesMut) {
        buffer.put_slice(&self.to_le_bytes());
    }

    fn into_value(self) -> Value {
        Value::Int256(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int256(v) => Some(*v),
            Value::UInt256(v) => {
                I256::from_sign_magnitude(false, *v)
            }
            Value::UInt128(v) => {
                I256::from_sign_magnitude(false, U256::from(*v))
            }
            other => other.as_i128().map(I256::from),
        }
    }
}

impl FixedSize for U256 {
    const SIZE: usize = 32;

    fn read_from(buffer: &mut &[u8]) -> Self {
        U256::from_le_bytes(read_wide(buffer))
    }

    fn write_to(&self, buffer: &mut BytesMut) {
        buffer.put_slice(&self.to_le_bytes());
    }

    fn into_value(self) -> Value {
        Value::UInt256(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::UInt256(v) => Some(*v),
            Value::Int256(v) if !v.is_negative() => Some(v.unsigned_abs()),
            other => other.as_u128().map(U256::from),
        }
    }
}

/// Handler for every fixed-width numeric type, Bool included.
pub struct ColumnVector<T: FixedSize> {
    type_: Type,
    options: ColumnOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T: FixedSize> ColumnVector<T> {
    pub fn new(type_: Type, options: ColumnOptions) -> Self {
        Self { type_, options, _marker: PhantomData }
    }

    /// Decode `rows` raw values without wrapping them into [`Value`].
    pub async fn read_raw(
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<T>> {
        let raw = reader.read(rows * T::SIZE).await?;
        let mut slice: &[u8] = &raw;
        Ok((0..rows).map(|_| T::read_from(&mut slice)).collect())
    }

    pub fn write_raw(items: &[T], buffer: &mut BytesMut) {
        buffer.reserve(items.len() * T::SIZE);
        for item in items {
            item.write_to(buffer);
        }
    }
}

#[async_trait]
impl<T: FixedSize> Column for ColumnVector<T> {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        T::default().into_value()
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let raw = reader.read(rows * T::SIZE).await?;
        let mut slice: &[u8] = &raw;
        Ok((0..rows).map(|_| T::read_from(&mut slice).into_value()).collect())
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        buffer.reserve(items.len() * T::SIZE);
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            T::from_value(item)
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?
                .write_to(buffer);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub type ColumnBool = ColumnVector<bool>;
pub type ColumnInt8 = ColumnVector<i8>;
pub type ColumnInt16 = ColumnVector<i16>;
pub type ColumnInt32 = ColumnVector<i32>;
pub type ColumnInt64 = ColumnVector<i64>;
pub type ColumnInt128 = ColumnVector<i128>;
pub type ColumnInt256 = ColumnVector<I256>;
pub type ColumnUInt8 = ColumnVector<u8>;
pub type ColumnUInt16 = ColumnVector<u16>;
pub type ColumnUInt32 = ColumnVector<u32>;
pub type ColumnUInt64 = ColumnVector<u64>;
pub type ColumnUInt128 = ColumnVector<u128>;
pub type ColumnUInt256 = ColumnVector<U256>;
pub type ColumnFloat32 = ColumnVector<f32>;
pub type ColumnFloat64 = ColumnVector<f64>;
