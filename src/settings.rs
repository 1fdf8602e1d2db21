//! Query settings and their two wire forms.
//!
//! Servers at revision 54429 and later take every setting as a
//! `(name, flags, value)` string triple. Older servers expect each value in
//! the binary form of the setting's type.

use std::fmt;

use bytes::BytesMut;

use crate::io::buffer_utils;
use crate::protocol::{
    revision,
    settings_flags,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Bool(v) => write!(f, "{}", *v as u8),
            SettingValue::Int(v) => write!(f, "{}", v),
            SettingValue::UInt(v) => write!(f, "{}", v),
            SettingValue::Float(v) => write!(f, "{}", v),
            SettingValue::String(v) => f.write_str(v),
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<i32> for SettingValue {
    fn from(v: i32) -> Self {
        SettingValue::Int(v as i64)
    }
}

impl From<u64> for SettingValue {
    fn from(v: u64) -> Self {
        SettingValue::UInt(v)
    }
}

impl From<u32> for SettingValue {
    fn from(v: u32) -> Self {
        SettingValue::UInt(v as u64)
    }
}

impl From<f64> for SettingValue {
    fn from(v: f64) -> Self {
        SettingValue::Float(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::String(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        SettingValue::String(v)
    }
}

/// Ordered `name = value` list. Setting a name twice keeps the last value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    items: Vec<(String, SettingValue)>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<SettingValue>) {
        let name = name.into();
        let value = value.into();
        match self.items.iter_mut().find(|(n, _)| *n == name) {
            Some(item) => item.1 = value,
            None => self.items.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&SettingValue> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SettingValue)> {
        self.items.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// `self` with every setting of `overrides` applied on top.
    pub fn merged(&self, overrides: &Settings) -> Settings {
        let mut out = self.clone();
        for (name, value) in overrides.iter() {
            out.set(name, value.clone());
        }
        out
    }

    /// Serialize for a server at `revision`, terminated by an empty name.
    pub fn write_to(&self, buffer: &mut BytesMut, revision: u64, important: bool) {
        let as_strings = revision >= revision::WITH_SETTINGS_SERIALIZED_AS_STRINGS;
        let flags = if important { settings_flags::IMPORTANT } else { 0 };

        for (name, value) in &self.items {
            buffer_utils::write_string(buffer, name);
            if as_strings {
                buffer_utils::write_varint(buffer, flags);
                buffer_utils::write_string(buffer, &value.to_string());
            } else {
                write_typed(buffer, value);
            }
        }
        buffer_utils::write_string(buffer, "");
    }
}

fn write_typed(buffer: &mut BytesMut, value: &SettingValue) {
    match value {
        SettingValue::Bool(v) => buffer_utils::write_varint(buffer, *v as u64),
        SettingValue::UInt(v) => buffer_utils::write_varint(buffer, *v),
        SettingValue::Int(v) => buffer_utils::write_varint_signed(buffer, *v),
        SettingValue::Float(_) | SettingValue::String(_) => {
            buffer_utils::write_string(buffer, &value.to_string())
        }
    }
}

impl<N, V> FromIterator<(N, V)> for Settings
where
    N: Into<String>,
    V: Into<SettingValue>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut settings = Settings::new();
        for (name, value) in iter {
            settings.set(name, value);
        }
        settings
    }
}
