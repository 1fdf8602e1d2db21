//! Date and time columns.
//!
//! All four types are integers counted from the Unix epoch. Values are
//! always UTC: a column timezone (`DateTime('Europe/Moscow')`) is kept in
//! the [`Type`] for the caller but never applied to the instants.

use std::any::Any;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{
    DateTime,
    Datelike,
    NaiveDate,
    Utc,
};

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

/// `num_days_from_ce` of 1970-01-01.
const EPOCH_DAYS_FROM_CE: i64 = 719_163;
const SECONDS_PER_DAY: i64 = 86_400;

fn date_from_days(days: i64) -> Result<NaiveDate> {
    i32::try_from(days + EPOCH_DAYS_FROM_CE)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| Error::Protocol(format!("day {} out of range", days)))
}

fn days_from_date(date: &NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 - EPOCH_DAYS_FROM_CE
}

fn instant(seconds: i64, nanos: u32) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, nanos).ok_or_else(|| {
        Error::Protocol(format!("timestamp {} out of range", seconds))
    })
}

/// Days since the epoch of a Date or DateTime value.
fn value_days(value: &Value) -> Option<i64> {
    match value {
        Value::Date(d) => Some(days_from_date(d)),
        Value::DateTime(t) => Some(days_from_date(&t.date_naive())),
        _ => None,
    }
}

/// Date: UInt16 days since 1970-01-01.
pub struct ColumnDate {
    type_: Type,
    options: ColumnOptions,
}

impl ColumnDate {
    pub fn new(options: ColumnOptions) -> Self {
        Self { type_: Type::Simple(TypeCode::Date), options }
    }
}

#[async_trait]
impl Column for ColumnDate {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Date(NaiveDate::default())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        ColumnVector::<u16>::read_raw(reader, rows)
            .await?
            .into_iter()
            .map(|days| date_from_days(days as i64).map(Value::Date))
            .collect()
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
            let days = value_days(item)
                .and_then(|d| u16::try_from(d).ok())
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            raw.push(days);
        }
        ColumnVector::<u16>::write_raw(&raw, buffer);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Date32: Int32 days since 1970-01-01, negative before the epoch.
pub struct ColumnDate32 {
    type_: Type,
    options: ColumnOptions,
}

impl ColumnDate32 {
    pub fn new(options: ColumnOptions) -> Self {
        Self { type_: Type::Simple(TypeCode::Date32), options }
    }
}

#[async_trait]
impl Column for ColumnDate32 {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::Date(NaiveDate::default())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        ColumnVector::<i32>::read_raw(reader, rows)
            .await?
            .into_iter()
            .map(|days| date_from_days(days as i64).map(Value::Date))
            .collect()
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
            let days = value_days(item)
                .and_then(|d| i32::try_from(d).ok())
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            raw.push(days);
        }
        ColumnVector::<i32>::write_raw(&raw, buffer);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// DateTime: UInt32 seconds since the epoch. Integers are accepted on write
/// as raw timestamps.
pub struct ColumnDateTime {
    type_: Type,
    options: ColumnOptions,
}

impl ColumnDateTime {
    pub fn new(type_: Type, options: ColumnOptions) -> Self {
        Self { type_, options }
    }

    pub fn timezone(&self) -> Option<&str> {
        match &self.type_ {
            Type::DateTime { timezone } => timezone.as_deref(),
            _ => None,
        }
    }
}

#[async_trait]
impl Column for ColumnDateTime {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::DateTime(DateTime::<Utc>::default())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        ColumnVector::<u32>::read_raw(reader, rows)
            .await?
            .into_iter()
            .map(|secs| instant(secs as i64, 0).map(Value::DateTime))
            .collect()
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
            let seconds = match item {
                Value::DateTime(t) => Some(t.timestamp() as i128),
                Value::Date(d) => Some((days_from_date(d) * SECONDS_PER_DAY) as i128),
                other => other.as_i128(),
            };
            let seconds = seconds
                .and_then(|s| u32::try_from(s).ok())
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            raw.push(seconds);
        }
        ColumnVector::<u32>::write_raw(&raw, buffer);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// DateTime64(p): Int64 ticks of 10^-p seconds since the epoch. Sub-tick
/// precision is truncated on write.
pub struct ColumnDateTime64 {
    type_: Type,
    precision: u32,
    options: ColumnOptions,
}

impl ColumnDateTime64 {
    pub fn new(type_: Type, precision: u32, options: ColumnOptions) -> Self {
        Self { type_, precision, options }
    }

    fn ticks_per_second(&self) -> i64 {
        10i64.pow(self.precision)
    }

    fn nanos_per_tick(&self) -> i64 {
        10i64.pow(9 - self.precision.min(9))
    }

    fn to_ticks(&self, value: &Value) -> Option<i64> {
        let (seconds, nanos) = match value {
            Value::DateTime(t) => (t.timestamp(), t.timestamp_subsec_nanos()),
            Value::Date(d) => (days_from_date(d) * SECONDS_PER_DAY, 0),
            other => return other.as_i128().and_then(|v| i64::try_from(v).ok()),
        };
        seconds
            .checked_mul(self.ticks_per_second())?
            .checked_add(nanos as i64 / self.nanos_per_tick())
    }
}

#[async_trait]
impl Column for ColumnDateTime64 {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        Value::DateTime(DateTime::<Utc>::default())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        let per_second = self.ticks_per_second();
        let per_tick = self.nanos_per_tick();
        ColumnVector::<i64>::read_raw(reader, rows)
            .await?
            .into_iter()
            .map(|ticks| {
                let seconds = ticks.div_euclid(per_second);
                let nanos = ticks.rem_euclid(per_second) * per_tick;
                instant(seconds, nanos as u32).map(Value::DateTime)
            })
            .collect()
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
            let ticks = self
                .to_ticks(item)
                .ok_or_else(|| Error::mismatch(self.type_.name(), item))?;
            raw.push(ticks);
        }
        ColumnVector::<i64>::write_raw(&raw, buffer);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
