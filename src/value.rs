//! The reflection model the marshal engine walks.
//!
//! Every marshalable type describes itself through [`Marshal::repr`], a
//! closed [`Repr`] enum the engine matches exhaustively. The only open
//! extension points are the capabilities: [`Marshaler`] (full control over
//! the attribute value), [`TextMarshaler`] (stored as a string) and the
//! optional [`Marshal::is_zero`] override.
//!
//! Structs take part through [`Record`], usually implemented by the
//! [`record!`](crate::record) macro.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use crate::attribute::AttributeValue;
use crate::errors::Result;
use crate::tag::{self, IndexMembership, KeyRole, TagInfo};

/// Static shape of a type, independent of any particular value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    Bool,
    Int,
    Uint,
    Float,
    String,
    Bytes,
    Time,
    Pointer(Box<Kind>),
    Interface,
    Map,
    Slice(Box<Kind>),
    Array(Box<Kind>),
    Struct,
    Marshaler,
    TextMarshaler,
}

/// A borrowed view of one value, as seen by the engine.
pub enum Repr<'a> {
    /// The untyped nil value.
    Nil,
    Marshaler(&'a dyn Marshaler),
    TextMarshaler(&'a dyn TextMarshaler),
    Bool(bool),
    Int(i64),
    Uint(u64),
    F32(f32),
    F64(f64),
    String(&'a str),
    Bytes(&'a [u8]),
    Time(&'a DateTime<Utc>),
    /// An optional value, with the static kind of its target.
    Pointer(Option<&'a dyn Marshal>, Kind),
    /// A dynamically typed slot; `None` is nil.
    Interface(Option<&'a dyn Marshal>),
    /// Map entries. Keys must present themselves as strings.
    Map(Vec<(&'a dyn Marshal, &'a dyn Marshal)>),
    /// Slice elements, with the static kind of an element.
    Slice(Vec<&'a dyn Marshal>, Kind),
    Array(Vec<&'a dyn Marshal>),
    Struct(&'a dyn Record),
}

impl Repr<'_> {
    /// Name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Repr::Nil => "nil",
            Repr::Marshaler(_) => "marshaler",
            Repr::TextMarshaler(_) => "text marshaler",
            Repr::Bool(_) => "bool",
            Repr::Int(_) => "int",
            Repr::Uint(_) => "uint",
            Repr::F32(_) => "f32",
            Repr::F64(_) => "f64",
            Repr::String(_) => "string",
            Repr::Bytes(_) => "bytes",
            Repr::Time(_) => "time",
            Repr::Pointer(..) => "pointer",
            Repr::Interface(_) => "interface",
            Repr::Map(_) => "map",
            Repr::Slice(..) => "slice",
            Repr::Array(_) => "array",
            Repr::Struct(_) => "struct",
        }
    }

    /// Kinds a struct field drops when zero even without `omitempty`;
    /// DynamoDB has no use for empty strings and collections.
    pub fn auto_omits(&self) -> bool {
        matches!(
            self,
            Repr::Nil
                | Repr::String(_)
                | Repr::Bytes(_)
                | Repr::Pointer(..)
                | Repr::Interface(_)
                | Repr::Map(_)
                | Repr::Slice(..)
        )
    }
}

/// A type the marshal engine can walk.
pub trait Marshal {
    /// Static kind of the implementing type.
    fn kind() -> Kind
    where
        Self: Sized;

    fn repr(&self) -> Repr<'_>;

    /// Custom emptiness check. `None` defers to the structural rules.
    fn is_zero(&self) -> Option<bool> {
        None
    }

    #[doc(hidden)]
    fn byte_slice(_items: &[Self]) -> Option<&[u8]>
    where
        Self: Sized,
    {
        None
    }
}

/// Full control over the encoded attribute value.
pub trait Marshaler {
    fn marshal_dynamo(&self) -> Result<AttributeValue>;
}

/// Text encoding, stored as a DynamoDB string.
pub trait TextMarshaler {
    fn marshal_text(&self) -> Result<String>;
}

/// Static description of one struct field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    name: &'static str,
    tag: &'static str,
    exported: bool,
    embedded: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, exported: bool) -> Self {
        Self {
            name,
            tag: "",
            exported,
            embedded: false,
        }
    }

    /// Attach a raw annotation such as `dynamo:"ID,hash" index:"a,range"`.
    pub const fn tag(mut self, tag: &'static str) -> Self {
        self.tag = tag;
        self
    }

    /// Mark the field as embedded: its own fields are spliced into the parent.
    pub const fn embed(mut self) -> Self {
        self.embedded = true;
        self
    }

    /// Natural field name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn raw_tag(&self) -> &'static str {
        self.tag
    }

    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub fn is_embedded(&self) -> bool {
        self.embedded
    }

    /// The `dynamo` annotation value, empty when absent.
    pub fn annotation(&self) -> String {
        tag::get(self.tag, "dynamo").unwrap_or_default()
    }

    pub fn info(&self) -> TagInfo {
        tag::parse(self.name, &self.annotation())
    }

    /// Resolve the full descriptor: name, modifiers, key role and index
    /// memberships.
    pub fn descriptor(&self) -> FieldDescriptor {
        let annotation = self.annotation();
        let info = tag::parse(self.name, &annotation);
        FieldDescriptor {
            name: info.name,
            special: info.special,
            omit_empty: info.omit_empty,
            key: tag::key_role(&annotation),
            global_indexes: self.memberships("index"),
            local_indexes: self.memberships("localIndex"),
        }
    }

    fn memberships(&self, key: &str) -> Vec<IndexMembership> {
        tag::lookup(self.tag, key)
            .iter()
            .filter_map(|value| {
                let membership = tag::index_membership(value);
                if membership.is_none() {
                    tracing::warn!(field = self.name, key, value = %value, "ignoring index annotation without a key role");
                }
                membership
            })
            .collect()
    }
}

/// Everything the annotations say about one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub special: String,
    pub omit_empty: bool,
    pub key: Option<KeyRole>,
    pub global_indexes: Vec<IndexMembership>,
    pub local_indexes: Vec<IndexMembership>,
}

/// One field of a record together with its value.
pub struct Field<'a> {
    pub spec: FieldSpec,
    pub value: &'a dyn Marshal,
}

impl<'a> Field<'a> {
    pub fn new(spec: FieldSpec, value: &'a dyn Marshal) -> Self {
        Self { spec, value }
    }
}

/// A struct whose fields the engine can enumerate in declaration order.
pub trait Record {
    fn fields(&self) -> Vec<Field<'_>>;
}

impl Marshal for bool {
    fn kind() -> Kind {
        Kind::Bool
    }

    fn repr(&self) -> Repr<'_> {
        Repr::Bool(*self)
    }
}

macro_rules! impl_marshal_int {
    ($($ty:ty),*) => {
        $(
            impl Marshal for $ty {
                fn kind() -> Kind {
                    Kind::Int
                }

                fn repr(&self) -> Repr<'_> {
                    Repr::Int(*self as i64)
                }
            }
        )*
    };
}

macro_rules! impl_marshal_uint {
    ($($ty:ty),*) => {
        $(
            impl Marshal for $ty {
                fn kind() -> Kind {
                    Kind::Uint
                }

                fn repr(&self) -> Repr<'_> {
                    Repr::Uint(*self as u64)
                }
            }
        )*
    };
}

impl_marshal_int!(i8, i16, i32, i64, isize);
impl_marshal_uint!(u16, u32, u64, usize);

impl Marshal for u8 {
    fn kind() -> Kind {
        Kind::Uint
    }

    fn repr(&self) -> Repr<'_> {
        Repr::Uint(u64::from(*self))
    }

    fn byte_slice(items: &[Self]) -> Option<&[u8]> {
        Some(items)
    }
}

impl Marshal for f32 {
    fn kind() -> Kind {
        Kind::Float
    }

    fn repr(&self) -> Repr<'_> {
        Repr::F32(*self)
    }
}

impl Marshal for f64 {
    fn kind() -> Kind {
        Kind::Float
    }

    fn repr(&self) -> Repr<'_> {
        Repr::F64(*self)
    }
}

impl Marshal for String {
    fn kind() -> Kind {
        Kind::String
    }

    fn repr(&self) -> Repr<'_> {
        Repr::String(self)
    }
}

impl Marshal for () {
    fn kind() -> Kind {
        Kind::Interface
    }

    fn repr(&self) -> Repr<'_> {
        Repr::Nil
    }
}

impl Marshal for DateTime<Utc> {
    fn kind() -> Kind {
        Kind::Time
    }

    fn repr(&self) -> Repr<'_> {
        Repr::Time(self)
    }

    fn is_zero(&self) -> Option<bool> {
        Some(self.timestamp() == 0 && self.timestamp_subsec_nanos() == 0)
    }
}

impl<T: Marshal> Marshal for Option<T> {
    fn kind() -> Kind {
        Kind::Pointer(Box::new(T::kind()))
    }

    fn repr(&self) -> Repr<'_> {
        Repr::Pointer(self.as_ref().map(|v| v as &dyn Marshal), T::kind())
    }
}

impl<T: Marshal> Marshal for Box<T> {
    fn kind() -> Kind {
        T::kind()
    }

    fn repr(&self) -> Repr<'_> {
        (**self).repr()
    }

    fn is_zero(&self) -> Option<bool> {
        (**self).is_zero()
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    fn kind() -> Kind {
        if T::byte_slice(&[]).is_some() {
            Kind::Bytes
        } else {
            Kind::Slice(Box::new(T::kind()))
        }
    }

    fn repr(&self) -> Repr<'_> {
        match T::byte_slice(self) {
            Some(bytes) => Repr::Bytes(bytes),
            None => Repr::Slice(self.iter().map(|v| v as &dyn Marshal).collect(), T::kind()),
        }
    }
}

impl<T: Marshal, const N: usize> Marshal for [T; N] {
    fn kind() -> Kind {
        if T::byte_slice(&[]).is_some() {
            Kind::Bytes
        } else {
            Kind::Array(Box::new(T::kind()))
        }
    }

    fn repr(&self) -> Repr<'_> {
        match T::byte_slice(self) {
            Some(bytes) => Repr::Bytes(bytes),
            None => Repr::Array(self.iter().map(|v| v as &dyn Marshal).collect()),
        }
    }
}

impl<K: Marshal, V: Marshal, S: BuildHasher> Marshal for HashMap<K, V, S> {
    fn kind() -> Kind {
        Kind::Map
    }

    fn repr(&self) -> Repr<'_> {
        Repr::Map(
            self.iter()
                .map(|(k, v)| (k as &dyn Marshal, v as &dyn Marshal))
                .collect(),
        )
    }
}

impl<K: Marshal, V: Marshal> Marshal for BTreeMap<K, V> {
    fn kind() -> Kind {
        Kind::Map
    }

    fn repr(&self) -> Repr<'_> {
        Repr::Map(
            self.iter()
                .map(|(k, v)| (k as &dyn Marshal, v as &dyn Marshal))
                .collect(),
        )
    }
}

impl Marshal for serde_json::Value {
    fn kind() -> Kind {
        Kind::Interface
    }

    fn repr(&self) -> Repr<'_> {
        use serde_json::Value;

        let inner: &dyn Marshal = match self {
            Value::Null => return Repr::Interface(None),
            Value::Bool(b) => b,
            Value::Number(n) => n,
            Value::String(s) => s,
            Value::Array(items) => items,
            Value::Object(map) => map,
        };
        Repr::Interface(Some(inner))
    }
}

impl Marshal for serde_json::Number {
    fn kind() -> Kind {
        Kind::Float
    }

    fn repr(&self) -> Repr<'_> {
        if let Some(i) = self.as_i64() {
            Repr::Int(i)
        } else if let Some(u) = self.as_u64() {
            Repr::Uint(u)
        } else {
            Repr::F64(self.as_f64().unwrap_or(f64::NAN))
        }
    }
}

impl Marshal for serde_json::Map<String, serde_json::Value> {
    fn kind() -> Kind {
        Kind::Map
    }

    fn repr(&self) -> Repr<'_> {
        Repr::Map(
            self.iter()
                .map(|(k, v)| (k as &dyn Marshal, v as &dyn Marshal))
                .collect(),
        )
    }
}
