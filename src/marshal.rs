//! Marshal engine: Rust values to attribute values.
//!
//! Dispatch order for every value: nil, then the [`Marshaler`] capability,
//! then [`TextMarshaler`], then the structural shape reported by
//! [`Marshal::repr`].
//!
//! [`Marshaler`]: crate::Marshaler
//! [`TextMarshaler`]: crate::TextMarshaler

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;

use crate::attribute::{AttributeValue, Item};
use crate::errors::{Error, Result};
use crate::tag;
use crate::value::{Kind, Marshal, Record, Repr};

/// Encode a value. `Ok(None)` means "no value": the caller drops it.
pub fn marshal(value: &dyn Marshal, special: &str) -> Result<Option<AttributeValue>> {
    let av = match value.repr() {
        Repr::Nil => AttributeValue::Null,
        Repr::Marshaler(m) => m.marshal_dynamo()?,
        Repr::TextMarshaler(t) => {
            let text = t.marshal_text()?;
            if text.is_empty() {
                return Ok(None);
            }
            AttributeValue::S(text)
        }
        Repr::Pointer(None, _) | Repr::Interface(None) => AttributeValue::Null,
        Repr::Pointer(Some(inner), _) | Repr::Interface(Some(inner)) => {
            return marshal(inner, special)
        }
        Repr::Bool(b) => AttributeValue::Bool(b),
        Repr::Int(i) => AttributeValue::N(i.to_string()),
        Repr::Uint(u) => AttributeValue::N(u.to_string()),
        Repr::F32(f) => AttributeValue::N(format_f32(f)?),
        Repr::F64(f) => AttributeValue::N(format_f64(f)?),
        Repr::String(s) => AttributeValue::S(s.to_string()),
        Repr::Bytes(b) => AttributeValue::B(b.to_vec()),
        Repr::Time(t) => format_time(t, special),
        Repr::Map(entries) => AttributeValue::M(marshal_map(&entries)?),
        Repr::Struct(record) => AttributeValue::M(marshal_record(record)?),
        Repr::Slice(items, elem) => {
            if special == tag::SET {
                marshal_set(&items, &elem)?
            } else {
                marshal_list(&items)?
            }
        }
        Repr::Array(items) => marshal_list(&items)?,
    };
    Ok(Some(av))
}

/// Encode a top-level value as an item.
///
/// Accepts structs, pointers to structs, string keyed maps and marshalers
/// that produce a map.
pub fn marshal_item(value: &dyn Marshal) -> Result<Item> {
    match value.repr() {
        Repr::Struct(record) => marshal_record(record),
        Repr::Pointer(Some(inner), _) | Repr::Interface(Some(inner)) => marshal_item(inner),
        Repr::Map(entries) => marshal_map(&entries),
        Repr::Marshaler(m) => match m.marshal_dynamo()? {
            AttributeValue::M(item) => Ok(item),
            other => Err(Error::NotAnItem(other.type_name())),
        },
        other => Err(Error::NotAnItem(other.type_name())),
    }
}

/// Encode the fields of a record.
///
/// Fields are visited in declaration order. Embedded records are flattened
/// into the result, so a later field with the same name overwrites an
/// earlier embedded one and vice versa.
pub fn marshal_record(record: &dyn Record) -> Result<Item> {
    let mut item = Item::new();

    for field in record.fields() {
        if !field.spec.is_exported() {
            continue;
        }
        let info = field.spec.info();
        if info.name == tag::SKIP {
            continue;
        }
        if (info.omit_empty || field.value.repr().auto_omits()) && is_zero(field.value) {
            continue;
        }

        if field.spec.is_embedded() {
            if let Some(inner) = embedded_record(field.value) {
                item.extend(marshal_record(inner)?);
                continue;
            }
        }

        if let Some(av) = marshal(field.value, &info.special)? {
            item.insert(info.name, av);
        }
    }

    Ok(item)
}

/// Whether a value counts as empty for omission.
pub fn is_zero(value: &dyn Marshal) -> bool {
    if let Some(zero) = value.is_zero() {
        return zero;
    }

    match value.repr() {
        // the encoded form of these may still carry meaning
        Repr::Marshaler(_) | Repr::TextMarshaler(_) => false,
        Repr::Nil => true,
        Repr::Bool(b) => !b,
        Repr::Int(i) => i == 0,
        Repr::Uint(u) => u == 0,
        Repr::F32(f) => f == 0.0,
        Repr::F64(f) => f == 0.0,
        Repr::String(s) => s.is_empty(),
        Repr::Bytes(b) => b.is_empty(),
        Repr::Time(t) => t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0,
        Repr::Pointer(p, _) => p.is_none(),
        Repr::Interface(i) => i.is_none(),
        Repr::Map(entries) => entries.is_empty(),
        Repr::Slice(items, _) => items.is_empty(),
        Repr::Array(items) => items.iter().all(|v| is_zero(*v)),
        Repr::Struct(record) => record.fields().iter().all(|f| is_zero(f.value)),
    }
}

/// The record behind an embedded field: the struct itself or the target of
/// a non-empty pointer.
pub(crate) fn embedded_record(value: &dyn Marshal) -> Option<&dyn Record> {
    match value.repr() {
        Repr::Struct(record) => Some(record),
        Repr::Pointer(Some(inner), _) => embedded_record(inner),
        _ => None,
    }
}

fn marshal_map(entries: &[(&dyn Marshal, &dyn Marshal)]) -> Result<Item> {
    let mut map = HashMap::with_capacity(entries.len());
    for (key, value) in entries {
        let key = match key.repr() {
            Repr::String(s) => s.to_string(),
            other => return Err(Error::UnsupportedMapKey(other.type_name())),
        };
        if let Some(av) = marshal(*value, "")? {
            map.insert(key, av);
        }
    }
    Ok(map)
}

fn marshal_list(items: &[&dyn Marshal]) -> Result<AttributeValue> {
    let mut list = Vec::with_capacity(items.len());
    for item in items {
        if let Some(av) = marshal(*item, "")? {
            list.push(av);
        }
    }
    Ok(AttributeValue::L(list))
}

fn marshal_set(items: &[&dyn Marshal], elem: &Kind) -> Result<AttributeValue> {
    match elem {
        Kind::TextMarshaler | Kind::String | Kind::Time => items
            .iter()
            .map(|v| set_text(*v))
            .collect::<Result<_>>()
            .map(AttributeValue::Ss),
        Kind::Int | Kind::Uint | Kind::Float => items
            .iter()
            .map(|v| set_text(*v))
            .collect::<Result<_>>()
            .map(AttributeValue::Ns),
        Kind::Bytes => items
            .iter()
            .map(|v| match v.repr() {
                Repr::Bytes(b) => Ok(b.to_vec()),
                other => Err(Error::InvalidSet(other.type_name().to_string())),
            })
            .collect::<Result<_>>()
            .map(AttributeValue::Bs),
        other => Err(Error::InvalidSet(format!("{other:?}"))),
    }
}

fn set_text(value: &dyn Marshal) -> Result<String> {
    match value.repr() {
        Repr::TextMarshaler(t) => t.marshal_text(),
        Repr::String(s) => Ok(s.to_string()),
        Repr::Int(i) => Ok(i.to_string()),
        Repr::Uint(u) => Ok(u.to_string()),
        Repr::F32(f) => format_f32(f),
        Repr::F64(f) => format_f64(f),
        Repr::Time(t) => Ok(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        other => Err(Error::InvalidSet(other.type_name().to_string())),
    }
}

fn format_time(t: &DateTime<Utc>, special: &str) -> AttributeValue {
    if special == tag::UNIX_TIME {
        AttributeValue::N(t.timestamp().to_string())
    } else {
        AttributeValue::S(t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }
}

/// Shortest decimal text that round-trips, never in exponent form.
fn format_f64(f: f64) -> Result<String> {
    if !f.is_finite() {
        return Err(Error::NonFiniteNumber(f));
    }
    Ok(f.to_string())
}

fn format_f32(f: f32) -> Result<String> {
    if !f.is_finite() {
        return Err(Error::NonFiniteNumber(f64::from(f)));
    }
    Ok(f.to_string())
}
