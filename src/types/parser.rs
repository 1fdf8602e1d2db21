use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::{
    EnumItem,
    Type,
    TypeCode,
};
use crate::{
    Error,
    Result,
};

thread_local! {
    static TYPE_CACHE: RefCell<HashMap<String, Type>> =
        RefCell::new(HashMap::new());
}

/// Parse a ClickHouse type spec into a [`Type`].
///
/// Results are cached per thread, keyed by the exact spec string; block
/// headers repeat the same handful of types over and over.
pub fn parse_type(spec: &str) -> Result<Type> {
    if let Some(cached) =
        TYPE_CACHE.with(|cache| cache.borrow().get(spec).cloned())
    {
        return Ok(cached);
    }

    let parsed = parse(spec)?;
    TYPE_CACHE.with(|cache| {
        cache.borrow_mut().insert(spec.to_string(), parsed.clone())
    });
    Ok(parsed)
}

/// Non-parametric names, built once on first use.
fn scalar_types() -> &'static HashMap<&'static str, Type> {
    static SCALARS: OnceLock<HashMap<&'static str, Type>> = OnceLock::new();
    SCALARS.get_or_init(|| {
        let mut map = HashMap::new();
        for code in [
            TypeCode::Nothing,
            TypeCode::Bool,
            TypeCode::Int8,
            TypeCode::Int16,
            TypeCode::Int32,
            TypeCode::Int64,
            TypeCode::Int128,
            TypeCode::Int256,
            TypeCode::UInt8,
            TypeCode::UInt16,
            TypeCode::UInt32,
            TypeCode::UInt64,
            TypeCode::UInt128,
            TypeCode::UInt256,
            TypeCode::Float32,
            TypeCode::Float64,
            TypeCode::String,
            TypeCode::Date,
            TypeCode::Date32,
            TypeCode::UUID,
            TypeCode::IPv4,
            TypeCode::IPv6,
        ] {
            map.insert(code.name(), Type::Simple(code));
        }
        map.insert("DateTime", Type::DateTime { timezone: None });
        map.insert("JSON", Type::Json);

        let point = Type::point();
        let ring = Type::array(point.clone());
        let polygon = Type::array(ring.clone());
        map.insert("MultiPolygon", Type::array(polygon.clone()));
        map.insert("Polygon", polygon);
        map.insert("Ring", ring);
        map.insert("Point", point);

        for name in [
            "IntervalNanosecond",
            "IntervalMicrosecond",
            "IntervalMillisecond",
            "IntervalSecond",
            "IntervalMinute",
            "IntervalHour",
            "IntervalDay",
            "IntervalWeek",
            "IntervalMonth",
            "IntervalQuarter",
            "IntervalYear",
        ] {
            map.insert(name, Type::int64());
        }
        map
    })
}

fn unknown(spec: &str) -> Error {
    Error::UnknownType(spec.to_string())
}

fn parse(spec: &str) -> Result<Type> {
    let spec = spec.trim();

    let Some(open) = spec.find('(') else {
        return scalar_types().get(spec).cloned().ok_or_else(|| unknown(spec));
    };
    if !spec.ends_with(')') {
        return Err(unknown(spec));
    }

    let name = spec[..open].trim();
    let inner = &spec[open + 1..spec.len() - 1];
    let args = split_arguments(inner).ok_or_else(|| unknown(spec))?;

    match (name, args.as_slice()) {
        ("Array", [item]) => Ok(Type::array(parse(item)?)),
        ("Nullable", [nested]) => Ok(Type::nullable(parse(nested)?)),
        ("LowCardinality", [nested]) => {
            Ok(Type::low_cardinality(parse(nested)?))
        }
        ("Map", [key, value]) => Ok(Type::map(parse(key)?, parse(value)?)),
        ("Tuple", elements) if !elements.is_empty() => {
            parse_tuple(spec, elements)
        }
        ("Nested", elements) if !elements.is_empty() => {
            let tuple = parse_tuple(spec, elements)?;
            let named = matches!(
                &tuple,
                Type::Tuple { names, .. } if !names.is_empty()
            );
            if !named {
                return Err(unknown(spec));
            }
            Ok(Type::array(tuple))
        }
        ("SimpleAggregateFunction", [_function, inner]) => parse(inner),
        ("Decimal", [precision, scale]) => {
            let precision = parse_number(spec, precision)?;
            let scale = parse_number(spec, scale)?;
            if precision == 0 || precision > 76 || scale > precision {
                return Err(unknown(spec));
            }
            Ok(Type::Decimal { precision, scale })
        }
        ("Decimal32", [scale]) => decimal_with_bits(spec, 9, scale),
        ("Decimal64", [scale]) => decimal_with_bits(spec, 18, scale),
        ("Decimal128", [scale]) => decimal_with_bits(spec, 38, scale),
        ("Decimal256", [scale]) => decimal_with_bits(spec, 76, scale),
        ("Enum8", _) => {
            let items = parse_enum_items(spec, inner)?;
            if items.iter().any(|i| i8::try_from(i.value).is_err()) {
                return Err(unknown(spec));
            }
            Ok(Type::Enum8 { items })
        }
        ("Enum16", _) => {
            Ok(Type::Enum16 { items: parse_enum_items(spec, inner)? })
        }
        ("DateTime", [timezone]) => Ok(Type::DateTime {
            timezone: Some(unquote(spec, timezone)?),
        }),
        ("DateTime64", [precision]) => Ok(Type::DateTime64 {
            precision: parse_precision(spec, precision)?,
            timezone: None,
        }),
        ("DateTime64", [precision, timezone]) => Ok(Type::DateTime64 {
            precision: parse_precision(spec, precision)?,
            timezone: Some(unquote(spec, timezone)?),
        }),
        ("FixedString", [size]) => {
            let size = parse_number(spec, size)? as usize;
            if size == 0 {
                return Err(unknown(spec));
            }
            Ok(Type::FixedString { size })
        }
        ("Object", [kind]) if kind.eq_ignore_ascii_case("'json'") => {
            Ok(Type::Json)
        }
        _ => Err(unknown(spec)),
    }
}

/// Split a parenthesised argument list on top-level commas.
///
/// Commas nested in parentheses or inside single-quoted literals do not
/// split. Returns `None` when parentheses or quotes don't balance.
fn split_arguments(inner: &str) -> Option<Vec<&str>> {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, ch) in inner.char_indices() {
        if in_quotes {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '\'' => in_quotes = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '\'' => in_quotes = true,
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || in_quotes {
        return None;
    }
    let last = inner[start..].trim();
    if !last.is_empty() || !args.is_empty() {
        args.push(last);
    }
    if args.iter().any(|a| a.is_empty()) {
        return None;
    }
    Some(args)
}

fn parse_tuple(spec: &str, elements: &[&str]) -> Result<Type> {
    let mut item_types = Vec::with_capacity(elements.len());
    let mut names = Vec::new();

    for element in elements {
        match split_element_name(element) {
            Some((name, type_spec)) => {
                names.push(name);
                item_types.push(parse(type_spec)?);
            }
            None => item_types.push(parse(element)?),
        }
    }

    // Either every element is named or none is.
    if !names.is_empty() && names.len() != item_types.len() {
        return Err(unknown(spec));
    }
    Ok(Type::Tuple { item_types, names })
}

/// Split `name Type` into its parts; plain `Type` yields `None`.
fn split_element_name(element: &str) -> Option<(String, &str)> {
    if let Some(rest) = element.strip_prefix('`') {
        let end = rest.find('`')?;
        let type_spec = rest[end + 1..].trim();
        return (!type_spec.is_empty())
            .then(|| (rest[..end].to_string(), type_spec));
    }

    let ident_end = element
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(element.len());
    let rest = &element[ident_end..];
    if ident_end == 0 || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let type_spec = rest.trim();
    (!type_spec.is_empty())
        .then(|| (element[..ident_end].to_string(), type_spec))
}

fn parse_number(spec: &str, arg: &str) -> Result<u32> {
    arg.trim().parse::<u32>().map_err(|_| unknown(spec))
}

fn parse_precision(spec: &str, arg: &str) -> Result<u32> {
    let precision = parse_number(spec, arg)?;
    if precision > 9 {
        return Err(unknown(spec));
    }
    Ok(precision)
}

fn decimal_with_bits(spec: &str, precision: u32, scale: &str) -> Result<Type> {
    let scale = parse_number(spec, scale)?;
    if scale > precision {
        return Err(unknown(spec));
    }
    Ok(Type::Decimal { precision, scale })
}

/// Strip single quotes from a literal such as `'Europe/Moscow'`.
fn unquote(spec: &str, literal: &str) -> Result<String> {
    let literal = literal.trim();
    literal
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .map(|s| s.replace("\\'", "'").replace("\\\\", "\\"))
        .ok_or_else(|| unknown(spec))
}

/// Parse `'a' = 1, 'b\'c' = 2` into enum items.
fn parse_enum_items(spec: &str, options: &str) -> Result<Vec<EnumItem>> {
    let mut items = Vec::new();
    let mut chars = options.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        match chars.next() {
            None => break,
            Some('\'') => {}
            Some(_) => return Err(unknown(spec)),
        }

        let mut name = String::new();
        loop {
            match chars.next() {
                Some('\\') => {
                    name.push(chars.next().ok_or_else(|| unknown(spec))?)
                }
                Some('\'') => break,
                Some(c) => name.push(c),
                None => return Err(unknown(spec)),
            }
        }

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.next() != Some('=') {
            return Err(unknown(spec));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut digits = String::new();
        while let Some(c) = chars.next_if(|c| *c == '-' || c.is_ascii_digit())
        {
            digits.push(c);
        }
        let value = digits.parse::<i16>().map_err(|_| unknown(spec))?;
        items.push(EnumItem { name, value });
    }

    if items.is_empty() {
        return Err(unknown(spec));
    }
    Ok(items)
}
