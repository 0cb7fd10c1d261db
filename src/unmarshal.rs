//! Unmarshal engine: attribute values back into Rust values.
//!
//! Decoding writes into an existing value through [`Unmarshal`], so
//! fields missing from an item keep whatever they held before.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::any::type_name;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::BuildHasher;
use std::str::FromStr;

use crate::attribute::{AttributeValue, Item};
use crate::errors::{Error, Result};
use crate::tag;
use crate::time;
use crate::value::FieldSpec;

/// A type that can be decoded in place.
pub trait Unmarshal {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()>;

    /// Decode a whole item. Records and maps read the item directly.
    fn unmarshal_item(&mut self, item: &Item) -> Result<()> {
        self.unmarshal(&AttributeValue::M(item.clone()))
    }

    /// The record behind an embedded field, allocating an empty pointer
    /// target first if needed.
    fn embedded(&mut self) -> Option<&mut dyn RecordMut> {
        None
    }

    /// Names an embedded field answers to, flattened through nested
    /// embedding.
    fn embedded_names(&self) -> Vec<String> {
        Vec::new()
    }

    #[doc(hidden)]
    fn from_byte_slice(_bytes: &[u8]) -> Option<Vec<Self>>
    where
        Self: Sized,
    {
        None
    }
}

/// Full control over decoding.
pub trait Unmarshaler {
    fn unmarshal_dynamo(&mut self, av: &AttributeValue) -> Result<()>;
}

/// Decoding from a DynamoDB string.
pub trait TextUnmarshaler {
    fn unmarshal_text(&mut self, text: &str) -> Result<()>;
}

/// One field of a record, borrowed for writing.
pub struct FieldMut<'a> {
    pub spec: FieldSpec,
    pub value: &'a mut dyn Unmarshal,
}

impl<'a> FieldMut<'a> {
    pub fn new(spec: FieldSpec, value: &'a mut dyn Unmarshal) -> Self {
        Self { spec, value }
    }
}

/// A struct whose fields can be written one by one.
pub trait RecordMut {
    fn fields_mut(&mut self) -> Vec<FieldMut<'_>>;
}

/// Decode a single attribute value into `out`.
pub fn unmarshal(av: &AttributeValue, out: &mut dyn Unmarshal) -> Result<()> {
    out.unmarshal(av)
}

/// Decode an item into `out`.
pub fn unmarshal_item(item: &Item, out: &mut dyn Unmarshal) -> Result<()> {
    out.unmarshal_item(item)
}

/// Decode an item into a fresh element and push it.
///
/// Nothing is pushed when decoding fails.
pub fn unmarshal_append<T: Unmarshal + Default>(item: &Item, out: &mut Vec<T>) -> Result<()> {
    let mut element = T::default();
    element.unmarshal_item(item)?;
    out.push(element);
    Ok(())
}

/// Decode a value into a record: `M` fills the fields, `Null` resets the
/// exported, non-skipped ones.
pub fn unmarshal_struct(record: &mut dyn RecordMut, av: &AttributeValue) -> Result<()> {
    match av {
        AttributeValue::M(item) => unmarshal_record(record, item),
        AttributeValue::Null => {
            for mut field in record.fields_mut() {
                if !field.spec.is_exported() || field.spec.info().name == tag::SKIP {
                    continue;
                }
                field.value.unmarshal(&AttributeValue::Null)?;
            }
            Ok(())
        }
        other => Err(mismatch(other, "struct")),
    }
}

/// Decode an item into the fields of a record.
///
/// Explicit fields take the keys matching their names. An empty embedded
/// pointer is allocated only when some incoming key belongs to it, and it
/// only receives the keys no explicit field claimed.
pub fn unmarshal_record(record: &mut dyn RecordMut, item: &Item) -> Result<()> {
    let mut fields = record.fields_mut();

    let claimed: HashSet<String> = fields
        .iter()
        .filter(|f| f.spec.is_exported() && !f.spec.is_embedded())
        .map(|f| f.spec.info().name)
        .filter(|name| name != tag::SKIP)
        .collect();

    for field in fields.iter_mut() {
        if !field.spec.is_exported() {
            continue;
        }
        let info = field.spec.info();
        if info.name == tag::SKIP {
            continue;
        }

        if field.spec.is_embedded() {
            let names = field.value.embedded_names();
            if !item.keys().any(|key| names.contains(key)) {
                continue;
            }
            let routed: Item = item
                .iter()
                .filter(|(key, _)| !claimed.contains(*key) && names.contains(key))
                .map(|(key, av)| (key.clone(), av.clone()))
                .collect();
            if let Some(inner) = field.value.embedded() {
                unmarshal_record(inner, &routed)?;
            }
            continue;
        }

        if let Some(av) = item.get(&info.name) {
            field.value.unmarshal(av)?;
        }
    }

    Ok(())
}

/// Field names of a record with embedded fields expanded in place.
pub fn flattened_names(specs: &[FieldSpec], values: &[&dyn Unmarshal]) -> Vec<String> {
    let mut names = Vec::new();
    for (spec, value) in specs.iter().zip(values) {
        if !spec.is_exported() {
            continue;
        }
        if spec.is_embedded() {
            names.extend(value.embedded_names());
            continue;
        }
        let name = spec.info().name;
        if name != tag::SKIP {
            names.push(name);
        }
    }
    names
}

/// Decode a text unmarshaler from `S`. `Null` leaves it untouched.
pub fn unmarshal_text(out: &mut dyn TextUnmarshaler, av: &AttributeValue) -> Result<()> {
    match av {
        AttributeValue::S(text) => out.unmarshal_text(text),
        AttributeValue::Null => Ok(()),
        other => Err(mismatch(other, "text unmarshaler")),
    }
}

pub(crate) fn mismatch(av: &AttributeValue, target: &'static str) -> Error {
    Error::Mismatch {
        found: av.type_name(),
        target,
    }
}

fn parse_number<T: FromStr>(text: &str, target: &'static str) -> Result<T> {
    text.parse().map_err(|_| Error::InvalidNumber {
        value: text.to_string(),
        target,
    })
}

macro_rules! impl_unmarshal_number {
    ($($ty:ty => $target:literal),*) => {
        $(
            impl Unmarshal for $ty {
                fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
                    match av {
                        AttributeValue::N(n) => *self = parse_number(n, $target)?,
                        AttributeValue::Null => *self = <$ty>::default(),
                        other => return Err(mismatch(other, $target)),
                    }
                    Ok(())
                }
            }
        )*
    };
}

impl_unmarshal_number!(
    i8 => "i8", i16 => "i16", i32 => "i32", i64 => "i64", isize => "isize",
    u16 => "u16", u32 => "u32", u64 => "u64", usize => "usize",
    f32 => "f32", f64 => "f64"
);

impl Unmarshal for u8 {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        match av {
            AttributeValue::N(n) => *self = parse_number(n, "u8")?,
            AttributeValue::Null => *self = 0,
            other => return Err(mismatch(other, "u8")),
        }
        Ok(())
    }

    fn from_byte_slice(bytes: &[u8]) -> Option<Vec<Self>> {
        Some(bytes.to_vec())
    }
}

impl Unmarshal for bool {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        match av {
            AttributeValue::Bool(b) => *self = *b,
            AttributeValue::Null => *self = false,
            other => return Err(mismatch(other, "bool")),
        }
        Ok(())
    }
}

impl Unmarshal for String {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        match av {
            AttributeValue::S(s) => *self = s.clone(),
            AttributeValue::Null => self.clear(),
            other => return Err(mismatch(other, "string")),
        }
        Ok(())
    }
}

impl Unmarshal for () {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        match av {
            AttributeValue::Null => Ok(()),
            other => Err(mismatch(other, "unit")),
        }
    }
}

impl Unmarshal for DateTime<Utc> {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        *self = match av {
            AttributeValue::Null => DateTime::default(),
            other => time::decode(other)?,
        };
        Ok(())
    }
}

impl<T: Unmarshal + Default> Unmarshal for Option<T> {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        if av.is_null() {
            *self = None;
            return Ok(());
        }
        match self {
            Some(inner) => inner.unmarshal(av),
            None => {
                let mut inner = T::default();
                inner.unmarshal(av)?;
                *self = Some(inner);
                Ok(())
            }
        }
    }

    fn unmarshal_item(&mut self, item: &Item) -> Result<()> {
        match self {
            Some(inner) => inner.unmarshal_item(item),
            None => {
                let mut inner = T::default();
                inner.unmarshal_item(item)?;
                *self = Some(inner);
                Ok(())
            }
        }
    }

    fn embedded(&mut self) -> Option<&mut dyn RecordMut> {
        self.get_or_insert_with(T::default).embedded()
    }

    fn embedded_names(&self) -> Vec<String> {
        match self {
            Some(inner) => inner.embedded_names(),
            None => default_embedded_names::<T>(),
        }
    }
}

thread_local! {
    static EXPANDING: RefCell<Vec<&'static str>> = const { RefCell::new(Vec::new()) };
}

/// Names of an empty embedded pointer target. A type already being expanded
/// further up (a record embedding a pointer to itself) contributes none.
fn default_embedded_names<T: Unmarshal + Default>() -> Vec<String> {
    let name = type_name::<T>();
    let entered = EXPANDING.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.contains(&name) {
            false
        } else {
            stack.push(name);
            true
        }
    });
    if !entered {
        return Vec::new();
    }

    let names = T::default().embedded_names();
    EXPANDING.with(|stack| {
        stack.borrow_mut().pop();
    });
    names
}

impl<T: Unmarshal> Unmarshal for Box<T> {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        (**self).unmarshal(av)
    }

    fn unmarshal_item(&mut self, item: &Item) -> Result<()> {
        (**self).unmarshal_item(item)
    }

    fn embedded(&mut self) -> Option<&mut dyn RecordMut> {
        (**self).embedded()
    }

    fn embedded_names(&self) -> Vec<String> {
        (**self).embedded_names()
    }
}

/// Spread a list or any of the set variants into single values.
fn elements(av: &AttributeValue) -> Option<Vec<AttributeValue>> {
    Some(match av {
        AttributeValue::L(items) => items.clone(),
        AttributeValue::Ss(items) => items.iter().cloned().map(AttributeValue::S).collect(),
        AttributeValue::Ns(items) => items.iter().cloned().map(AttributeValue::N).collect(),
        AttributeValue::Bs(items) => items.iter().cloned().map(AttributeValue::B).collect(),
        _ => return None,
    })
}

impl<T: Unmarshal + Default> Unmarshal for Vec<T> {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        if let AttributeValue::B(bytes) = av {
            return match T::from_byte_slice(bytes) {
                Some(decoded) => {
                    *self = decoded;
                    Ok(())
                }
                None => Err(mismatch(av, "slice")),
            };
        }
        if av.is_null() {
            self.clear();
            return Ok(());
        }

        let items = elements(av).ok_or_else(|| mismatch(av, "slice"))?;
        let mut decoded = Vec::with_capacity(items.len());
        for item in &items {
            let mut element = T::default();
            element.unmarshal(item)?;
            decoded.push(element);
        }
        *self = decoded;
        Ok(())
    }
}

impl<T: Unmarshal, const N: usize> Unmarshal for [T; N] {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        if let AttributeValue::B(bytes) = av {
            let decoded = T::from_byte_slice(bytes).ok_or_else(|| mismatch(av, "array"))?;
            for (slot, value) in self.iter_mut().zip(decoded) {
                *slot = value;
            }
            return Ok(());
        }
        if av.is_null() {
            for slot in self.iter_mut() {
                slot.unmarshal(&AttributeValue::Null)?;
            }
            return Ok(());
        }

        let items = elements(av).ok_or_else(|| mismatch(av, "array"))?;
        let mut items = items.iter();
        for slot in self.iter_mut() {
            match items.next() {
                Some(item) => slot.unmarshal(item)?,
                None => slot.unmarshal(&AttributeValue::Null)?,
            }
        }
        Ok(())
    }
}

macro_rules! impl_unmarshal_map {
    () => {
        fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
            match av {
                AttributeValue::M(item) => self.unmarshal_item(item),
                AttributeValue::Null => {
                    self.clear();
                    Ok(())
                }
                other => Err(mismatch(other, "map")),
            }
        }

        fn unmarshal_item(&mut self, item: &Item) -> Result<()> {
            self.clear();
            for (key, av) in item {
                let mut value = V::default();
                value.unmarshal(av)?;
                self.insert(key.clone(), value);
            }
            Ok(())
        }
    };
}

impl<V: Unmarshal + Default, S: BuildHasher> Unmarshal for HashMap<String, V, S> {
    impl_unmarshal_map!();
}

impl<V: Unmarshal + Default> Unmarshal for BTreeMap<String, V> {
    impl_unmarshal_map!();
}

impl Unmarshal for serde_json::Value {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        *self = json_value(av)?;
        Ok(())
    }
}

impl Unmarshal for serde_json::Map<String, serde_json::Value> {
    fn unmarshal(&mut self, av: &AttributeValue) -> Result<()> {
        match av {
            AttributeValue::M(item) => self.unmarshal_item(item),
            AttributeValue::Null => {
                self.clear();
                Ok(())
            }
            other => Err(mismatch(other, "map")),
        }
    }

    fn unmarshal_item(&mut self, item: &Item) -> Result<()> {
        self.clear();
        for (key, av) in item {
            self.insert(key.clone(), json_value(av)?);
        }
        Ok(())
    }
}

fn json_number(text: &str) -> Result<serde_json::Value> {
    let f: f64 = parse_number(text, "float")?;
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .ok_or_else(|| Error::InvalidNumber {
            value: text.to_string(),
            target: "float",
        })
}

/// Decode into the generic target. Numbers always come back as floats.
fn json_value(av: &AttributeValue) -> Result<serde_json::Value> {
    use serde_json::Value;

    Ok(match av {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => json_number(n)?,
        AttributeValue::B(b) => Value::String(BASE64.encode(b)),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null => Value::Null,
        AttributeValue::Ss(items) => items.iter().cloned().map(Value::String).collect(),
        AttributeValue::Ns(items) => items
            .iter()
            .map(|n| json_number(n))
            .collect::<Result<_>>()?,
        AttributeValue::Bs(items) => items
            .iter()
            .map(|b| Value::String(BASE64.encode(b)))
            .collect(),
        AttributeValue::L(items) => items.iter().map(json_value).collect::<Result<_>>()?,
        AttributeValue::M(item) => Value::Object(
            item.iter()
                .map(|(k, v)| Ok((k.clone(), json_value(v)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn n(s: &str) -> AttributeValue {
        AttributeValue::N(s.to_string())
    }

    #[test]
    fn numbers() {
        let mut i = 0i32;
        unmarshal(&n("-17"), &mut i).unwrap();
        assert_eq!(i, -17);

        let mut u = 0u64;
        unmarshal(&n("18446744073709551615"), &mut u).unwrap();
        assert_eq!(u, u64::MAX);

        let mut f = 0f64;
        unmarshal(&n("2.5"), &mut f).unwrap();
        assert_eq!(f, 2.5);

        unmarshal(&AttributeValue::Null, &mut i).unwrap();
        assert_eq!(i, 0);
    }

    #[test]
    fn overflow_is_an_error() {
        let mut small = 0i8;
        let err = unmarshal(&n("300"), &mut small).unwrap_err();
        assert!(matches!(err, Error::InvalidNumber { target: "i8", .. }));

        let mut unsigned = 0u32;
        assert!(unmarshal(&n("-1"), &mut unsigned).is_err());
        assert!(unmarshal(&n("abc"), &mut unsigned).is_err());
    }

    #[test]
    fn shape_mismatch() {
        let mut i = 0i64;
        let err = unmarshal(&AttributeValue::M(Item::new()), &mut i).unwrap_err();
        assert!(matches!(
            err,
            Error::Mismatch {
                found: "M",
                target: "i64"
            }
        ));

        let mut s = String::new();
        assert!(unmarshal(&n("1"), &mut s).is_err());
    }

    #[test]
    fn strings_and_bools() {
        let mut s = String::from("old");
        unmarshal(&AttributeValue::S("new".into()), &mut s).unwrap();
        assert_eq!(s, "new");
        unmarshal(&AttributeValue::Null, &mut s).unwrap();
        assert_eq!(s, "");

        let mut b = false;
        unmarshal(&AttributeValue::Bool(true), &mut b).unwrap();
        assert!(b);
    }

    #[test]
    fn options() {
        let mut value: Option<i64> = None;
        unmarshal(&n("5"), &mut value).unwrap();
        assert_eq!(value, Some(5));
        unmarshal(&AttributeValue::Null, &mut value).unwrap();
        assert_eq!(value, None);

        // a failed decode leaves an empty option empty
        assert!(unmarshal(&AttributeValue::S("x".into()), &mut value).is_err());
        assert_eq!(value, None);
    }

    #[test]
    fn vectors_from_lists_and_sets() {
        let mut ints: Vec<i32> = Vec::new();
        unmarshal(&AttributeValue::Ns(vec!["1".into(), "2".into(), "3".into()]), &mut ints).unwrap();
        assert_eq!(ints, vec![1, 2, 3]);

        unmarshal(&AttributeValue::L(vec![n("4")]), &mut ints).unwrap();
        assert_eq!(ints, vec![4]);

        let mut strings: Vec<String> = Vec::new();
        unmarshal(&AttributeValue::Ss(vec!["a".into(), "b".into()]), &mut strings).unwrap();
        assert_eq!(strings, vec!["a", "b"]);

        let mut blobs: Vec<Vec<u8>> = Vec::new();
        unmarshal(&AttributeValue::Bs(vec![vec![1], vec![2, 3]]), &mut blobs).unwrap();
        assert_eq!(blobs, vec![vec![1], vec![2, 3]]);

        unmarshal(&AttributeValue::Null, &mut strings).unwrap();
        assert!(strings.is_empty());
    }

    #[test]
    fn bytes() {
        let mut bytes: Vec<u8> = Vec::new();
        unmarshal(&AttributeValue::B(vec![9, 8, 7]), &mut bytes).unwrap();
        assert_eq!(bytes, vec![9, 8, 7]);

        let mut fixed = [0u8; 4];
        unmarshal(&AttributeValue::B(vec![1, 2]), &mut fixed).unwrap();
        assert_eq!(fixed, [1, 2, 0, 0]);

        let mut ints: Vec<i32> = Vec::new();
        assert!(unmarshal(&AttributeValue::B(vec![1]), &mut ints).is_err());
    }

    #[test]
    fn arrays_fill_missing_slots_with_zero() {
        let mut arr = [7i32; 3];
        unmarshal(&AttributeValue::L(vec![n("1"), n("2")]), &mut arr).unwrap();
        assert_eq!(arr, [1, 2, 0]);
    }

    #[test]
    fn maps() {
        let item = Item::from([("a".to_string(), n("1")), ("b".to_string(), n("2"))]);
        let mut map: HashMap<String, i32> = HashMap::from([("stale".to_string(), 9)]);
        unmarshal_item(&item, &mut map).unwrap();
        assert_eq!(map, HashMap::from([("a".to_string(), 1), ("b".to_string(), 2)]));

        let mut sorted: BTreeMap<String, i32> = BTreeMap::new();
        unmarshal(&AttributeValue::M(item), &mut sorted).unwrap();
        assert_eq!(sorted.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn generic_target() {
        let av = AttributeValue::M(Item::from([
            ("n".to_string(), n("12345")),
            ("s".to_string(), AttributeValue::S("x".into())),
            ("b".to_string(), AttributeValue::B(vec![0, 1, 2])),
            ("null".to_string(), AttributeValue::Null),
            ("ns".to_string(), AttributeValue::Ns(vec!["1".into(), "2.5".into()])),
            ("l".to_string(), AttributeValue::L(vec![AttributeValue::Bool(true)])),
        ]));
        let mut value = serde_json::Value::Null;
        unmarshal(&av, &mut value).unwrap();
        assert_eq!(
            value,
            json!({
                "n": 12345.0,
                "s": "x",
                "b": "AAEC",
                "null": null,
                "ns": [1.0, 2.5],
                "l": [true],
            })
        );
    }

    #[test]
    fn append_to_generic_maps() {
        let item = Item::from([
            ("UserID".to_string(), n("12345")),
            ("Page".to_string(), n("5")),
            ("Limit".to_string(), n("20")),
            ("Null".to_string(), AttributeValue::Null),
        ]);

        let mut results: Vec<HashMap<String, serde_json::Value>> = Vec::new();
        for _ in 0..15 {
            unmarshal_append(&item, &mut results).unwrap();
        }

        assert_eq!(results.len(), 15);
        for hit in &results {
            assert_eq!(hit["UserID"], json!(12345.0));
            assert_eq!(hit["Page"], json!(5.0));
            assert_eq!(hit["Limit"], json!(20.0));
            assert_eq!(hit["Null"], serde_json::Value::Null);
        }
    }

    #[test]
    fn failed_append_pushes_nothing() {
        let item = Item::from([("a".to_string(), AttributeValue::S("x".into()))]);
        let mut results: Vec<HashMap<String, i64>> = Vec::new();
        assert!(unmarshal_append(&item, &mut results).is_err());
        assert!(results.is_empty());
    }

    #[test]
    fn times() {
        let mut t = DateTime::<Utc>::default();
        unmarshal(&AttributeValue::S("2015-03-02T06:50:50Z".into()), &mut t).unwrap();
        assert_eq!(t.timestamp(), 1_425_279_050);

        unmarshal(&n("1447781270"), &mut t).unwrap();
        assert_eq!(t.timestamp(), 1_447_781_270);

        assert!(matches!(
            unmarshal(&AttributeValue::S("yesterday".into()), &mut t),
            Err(Error::InvalidTime { .. })
        ));
    }
}
