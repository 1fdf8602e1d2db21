//! LowCardinality(T) columns: a dictionary of distinct values plus one
//! integer key per row.
//!
//! ```text
//! state prefix:  UInt64 version (1)
//! per block:     Int64 serialization type  (key width | flags)
//!                Int64 dictionary size, dictionary column
//!                Int64 row count, keys of the chosen width
//! ```
//!
//! For LowCardinality(Nullable(T)) the dictionary is written as plain `T`
//! and entry 0 stands for NULL.

use std::any::Any;
use std::collections::HashMap;

use async_trait::async_trait;
use bytes::{
    BufMut,
    BytesMut,
};

use super::numeric::ColumnVector;
use super::{
    create_column,
    resolve_null,
    Column,
    ColumnOptions,
    ColumnRef,
    Value,
};
use crate::io::BufferedReader;
use crate::types::Type;
use crate::{
    Error,
    Result,
};

const SHARED_DICTIONARIES_VERSION: u64 = 1;
const KEY_WIDTH_MASK: u64 = 0x0f;
const HAS_ADDITIONAL_KEYS: u64 = 1 << 9;
const NEED_UPDATE_DICTIONARY: u64 = 1 << 10;

pub struct ColumnLowCardinality {
    type_: Type,
    dictionary: ColumnRef,
    nullable: bool,
    options: ColumnOptions,
}

impl ColumnLowCardinality {
    pub fn new(
        type_: Type,
        nested_type: &Type,
        options: ColumnOptions,
    ) -> Result<Self> {
        let (dictionary_type, nullable) = match nested_type {
            Type::Nullable { nested_type } => (nested_type.as_ref(), true),
            other => (other, false),
        };
        Ok(Self {
            type_,
            dictionary: create_column(dictionary_type, options)?,
            nullable,
            options,
        })
    }

    /// Dictionary in first-seen order and one key per item.
    fn build_index(&self, items: &[Value]) -> Result<(Vec<Value>, Vec<u64>)> {
        let mut index = Vec::new();
        let mut positions: HashMap<Vec<u8>, u64> = HashMap::new();
        if self.nullable {
            index.push(self.dictionary.null_value());
        }
        let default = self.dictionary.null_value();
        let mut keys = Vec::with_capacity(items.len());
        let mut scratch = BytesMut::new();
        for item in items {
            if self.nullable && item.is_null() {
                keys.push(0);
                continue;
            }
            let item = resolve_null(item, &default, &self.options, &self.type_)?;
            scratch.clear();
            self.dictionary.write_items(std::slice::from_ref(item), &mut scratch)?;
            let next = index.len() as u64;
            let key = *positions.entry(scratch.to_vec()).or_insert(next);
            if key == next {
                index.push(item.clone());
            }
            keys.push(key);
        }
        Ok((index, keys))
    }
}

fn key_width(index_size: usize) -> u64 {
    match index_size {
        0..=0xFF => 0,
        0x100..=0xFFFF => 1,
        _ if index_size as u64 <= 0xFFFF_FFFF => 2,
        _ => 3,
    }
}

#[async_trait]
impl Column for ColumnLowCardinality {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn null_value(&self) -> Value {
        if self.nullable {
            Value::Null
        } else {
            self.dictionary.null_value()
        }
    }

    fn is_nullable(&self) -> bool {
        self.nullable
    }

    async fn read_state_prefix(
        &self,
        reader: &mut BufferedReader<'_>,
    ) -> Result<()> {
        reader.read_u64_le().await?;
        Ok(())
    }

    async fn read_items(
        &self,
        reader: &mut BufferedReader<'_>,
        rows: usize,
    ) -> Result<Vec<Value>> {
        if rows == 0 {
            return Ok(Vec::new());
        }
        let serialization_type = reader.read_u64_le().await?;
        let index_size = reader.read_u64_le().await? as usize;
        let mut index = self.dictionary.read_items(reader, index_size).await?;
        if self.nullable {
            if let Some(first) = index.first_mut() {
                *first = Value::Null;
            }
        }

        let key_count = reader.read_u64_le().await? as usize;
        if key_count != rows {
            return Err(Error::Protocol(format!(
                "LowCardinality column has {} keys for {} rows",
                key_count, rows
            )));
        }
        let keys: Vec<u64> = match serialization_type & KEY_WIDTH_MASK {
            0 => ColumnVector::<u8>::read_raw(reader, key_count)
                .await?
                .into_iter()
                .map(u64::from)
                .collect(),
            1 => ColumnVector::<u16>::read_raw(reader, key_count)
                .await?
                .into_iter()
                .map(u64::from)
                .collect(),
            2 => ColumnVector::<u32>::read_raw(reader, key_count)
                .await?
                .into_iter()
                .map(u64::from)
                .collect(),
            _ => ColumnVector::<u64>::read_raw(reader, key_count).await?,
        };

        keys.into_iter()
            .map(|key| {
                index.get(key as usize).cloned().ok_or_else(|| {
                    Error::Protocol(format!(
                        "LowCardinality key {} outside dictionary of {}",
                        key, index_size
                    ))
                })
            })
            .collect()
    }

    fn write_state_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_u64_le(SHARED_DICTIONARIES_VERSION);
        Ok(())
    }

    fn write_items(
        &self,
        items: &[Value],
        buffer: &mut BytesMut,
    ) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let (index, keys) = self.build_index(items)?;
        let width = key_width(index.len());

        buffer.put_u64_le(width | HAS_ADDITIONAL_KEYS | NEED_UPDATE_DICTIONARY);
        buffer.put_u64_le(index.len() as u64);
        self.dictionary.write_items(&index, buffer)?;
        buffer.put_u64_le(keys.len() as u64);
        match width {
            0 => {
                let raw: Vec<u8> = keys.iter().map(|k| *k as u8).collect();
                ColumnVector::<u8>::write_raw(&raw, buffer);
            }
            1 => {
                let raw: Vec<u16> = keys.iter().map(|k| *k as u16).collect();
                ColumnVector::<u16>::write_raw(&raw, buffer);
            }
            2 => {
                let raw: Vec<u32> = keys.iter().map(|k| *k as u32).collect();
                ColumnVector::<u32>::write_raw(&raw, buffer);
            }
            _ => ColumnVector::<u64>::write_raw(&keys, buffer),
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
