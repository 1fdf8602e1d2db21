//! Decimal values and the Decimal(P, S) column handler.
//!
//! A [`Decimal`] is an exact scaled integer: `mantissa * 10^-scale`. The
//! column stores mantissas rescaled to the column's scale, in a signed
//! integer whose width follows the precision:
//!
//! | Precision | Storage |
//! |-----------|---------|
//! | 1..=9     | Int32   |
//! | 10..=18   | Int64   |
//! | 19..=38   | Int128  |
//! | 39..=76   | Int256  |

use std::any::Any;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::BytesMut;

use super::numeric::ColumnVector;
use super::wide::I256;
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

/// Exact decimal number. Equality ignores trailing fractional zeros, so
/// `1.50` equals `1.5`.
#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: I256,
    scale: u32,
}

impl Decimal {
    pub fn new(mantissa: impl Into<I256>, scale: u32) -> Self {
        Self { mantissa: mantissa.into(), scale }
    }

    pub fn mantissa(&self) -> I256 {
        self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Mantissa at another scale. Extra fractional digits are truncated
    /// toward zero; `None` when scaling up overflows.
    pub fn rescale(&self, scale: u32) -> Option<I256> {
        if scale >= self.scale {
            self.mantissa.checked_scale_up(scale - self.scale)
        } else {
            Some(self.mantissa.scale_down(self.scale - scale))
        }
    }

    /// Same number with trailing fractional zeros removed.
    pub fn normalize(&self) -> Self {
        let mut out = *self;
        while out.scale > 0 && out.mantissa.last_digit() == 0 {
            out.mantissa = out.mantissa.scale_down(1);
            out.scale -= 1;
        }
        out
    }

    /// Nearest f64; exactness is lost for more than ~15 digits.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let (a, b) = (self.normalize(), other.normalize());
        a.mantissa == b.mantissa && a.scale == b.scale
    }
}

impl Eq for Decimal {}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.scale as usize;
        if scale > 0 {
            if digits.len() <= scale {
                digits = format!("{:0>width$}", digits, width = scale + 1);
            }
            digits.insert(digits.len() - scale, '.');
        }
        if self.mantissa.is_negative() {
            digits.insert(0, '-');
        }
        f.pad(&digits)
    }
}

impl FromStr for Decimal {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("invalid decimal '{}'", s));
        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (int_part, frac_part) =
            unsigned.split_once('.').unwrap_or((unsigned, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(invalid());
        }
        let text = format!(
            "{}{}{}",
            if negative { "-" } else { "" },
            if int_part.is_empty() { "0" } else { int_part },
            frac_part
        );
        let mantissa = I256::from_str(&text).map_err(|_| invalid())?;
        Ok(Decimal::new(mantissa, frac_part.len() as u32))
    }
}

/// Storage width of a decimal column, by precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    Int32,
    Int64,
    Int128,
    Int256,
}

impl Storage {
    fn for_precision(precision: u32) -> Self {
        match precision {
            0..=9 => Storage::Int32,
            10..=18 => Storage::Int64,
            19..=38 => Storage::Int128,
            _ => Storage::Int256,
        }
    }
}

pub struct ColumnDecimal {
    type_: Type,
    precision: u32,
    scale: u32,
    storage: Storage,
    options: ColumnOptions,
}

impl ColumnDecimal {
    pub fn new(precision: u32, scale: u32, options: ColumnOptions) -> Self {
        Self {
            type_: Type::Decimal { precision, scale },
            precision,
            scale,
            storage: Storage::for_precision(precision),
            options,
        }
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Mantissa of `value` at this column's scale, range-checked.
    fn to_mantissa(&self, value: &Value) -> Result<I256> {
        let decimal = match value {
            Value::Decimal(d) => *d,
            Value::Int256(v) => Decimal::new(*v, 0),
            Value::Float32(v) => format!("{}", v).parse()?,
            Value::Float64(v) => format!("{}", v).parse()?,
            Value::String(s) => s.parse()?,
            other => match other.as_i128() {
                Some(v) => Decimal::new(v, 0),
                None => {
                    return Err(Error::mismatch(self.type_.name(), other))
                }
            },
        };
        decimal
            .rescale(self.scale)
            .filter(|m| m.digits() <= self.precision)
            .ok_or_else(|| Error::mismatch(self.type_.name(), value))
    }
}

#[async_trait]
impl Column for ColumnDecimal {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Decimal(Decimal::new(0i64, self.scale))
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let mantissas: Vec<I256> = match self.storage {
            Storage::Int32 => ColumnVector::<i32>::read_raw(reader, rows)
                .await?
                .into_iter()
                .map(|v| I256::from(v as i64))
                .collect(),
            Storage::Int64 => ColumnVector::<i64>::read_raw(reader, rows)
                .await?
                .into_iter()
                .map(I256::from)
                .collect(),
            Storage::Int128 => ColumnVector::<i128>::read_raw(reader, rows)
                .await?
                .into_iter()
                .map(I256::from)
                .collect(),
            Storage::Int256 => {
                ColumnVector::<I256>::read_raw(reader, rows).await?
            }
        };
        Ok(mantissas
            .into_iter()
            .map(|m| Value::Decimal(Decimal::new(m, self.scale)))
            .collect())
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        let default = self.null_value();
        let mut mantissas = Vec::with_capacity(items.len());
        for item in items {
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            mantissas.push(self.to_mantissa(item)?);
        }

        // The precision check bounds every mantissa to the storage width.
        let narrow = |m: &I256| {
            m.to_i128().ok_or_else(|| {
                Error::Logical(format!("decimal {} exceeds storage", m))
            })
        };
        match self.storage {
            Storage::Int32 => {
                let raw = mantissas
                    .iter()
                    .map(|m| narrow(m).map(|v| v as i32))
                    .collect::<Result<Vec<_>>>()?;
                ColumnVector::<i32>::write_raw(&raw, buffer);
            }
            Storage::Int64 => {
                let raw = mantissas
                    .iter()
                    .map(|m| narrow(m).map(|v| v as i64))
                    .collect::<Result<Vec<_>>>()?;
                ColumnVector::<i64>::write_raw(&raw, buffer);
            }
            Storage::Int128 => {
                let raw =
                    mantissas.iter().map(narrow).collect::<Result<Vec<_>>>()?;
                ColumnVector::<i128>::write_raw(&raw, buffer);
            }
            Storage::Int256 => {
                ColumnVector::<I256>::write_raw(&mantissas, buffer);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
