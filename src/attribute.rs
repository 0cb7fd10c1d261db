//! The attribute value union exchanged with DynamoDB.
//!
//! [`AttributeValue`] is the crate's own closed representation of one
//! DynamoDB value. It converts losslessly to and from the SDK's
//! `AttributeValue`, and serializes with serde as DynamoDB JSON
//! (`{"S": "x"}`, `{"N": "1"}`, `{"B": "<base64>"}`, ...).

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as SdkAttributeValue;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{Error, Result};

/// One item: attribute name to value.
pub type Item = HashMap<String, AttributeValue>;

/// A single DynamoDB attribute value.
///
/// Numbers are carried as decimal text so no precision is lost between
/// the wire and the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Wire", try_from = "Wire")]
pub enum AttributeValue {
    S(String),
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null,
    Ss(Vec<String>),
    Ns(Vec<String>),
    Bs(Vec<Vec<u8>>),
    L(Vec<AttributeValue>),
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// The DynamoDB type descriptor of this value (`S`, `N`, `BOOL`, ...).
    pub fn type_name(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "S",
            AttributeValue::N(_) => "N",
            AttributeValue::B(_) => "B",
            AttributeValue::Bool(_) => "BOOL",
            AttributeValue::Null => "NULL",
            AttributeValue::Ss(_) => "SS",
            AttributeValue::Ns(_) => "NS",
            AttributeValue::Bs(_) => "BS",
            AttributeValue::L(_) => "L",
            AttributeValue::M(_) => "M",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

/// DynamoDB JSON layout. Binary values travel as base64 text.
#[derive(Serialize, Deserialize)]
enum Wire {
    S(String),
    N(String),
    B(String),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null(bool),
    #[serde(rename = "SS")]
    Ss(Vec<String>),
    #[serde(rename = "NS")]
    Ns(Vec<String>),
    #[serde(rename = "BS")]
    Bs(Vec<String>),
    L(Vec<AttributeValue>),
    M(HashMap<String, AttributeValue>),
}

impl From<AttributeValue> for Wire {
    fn from(av: AttributeValue) -> Self {
        match av {
            AttributeValue::S(s) => Wire::S(s),
            AttributeValue::N(n) => Wire::N(n),
            AttributeValue::B(b) => Wire::B(BASE64.encode(b)),
            AttributeValue::Bool(b) => Wire::Bool(b),
            AttributeValue::Null => Wire::Null(true),
            AttributeValue::Ss(ss) => Wire::Ss(ss),
            AttributeValue::Ns(ns) => Wire::Ns(ns),
            AttributeValue::Bs(bs) => Wire::Bs(bs.iter().map(|b| BASE64.encode(b)).collect()),
            AttributeValue::L(list) => Wire::L(list),
            AttributeValue::M(map) => Wire::M(map),
        }
    }
}

impl TryFrom<Wire> for AttributeValue {
    type Error = Error;

    fn try_from(wire: Wire) -> Result<Self> {
        Ok(match wire {
            Wire::S(s) => AttributeValue::S(s),
            Wire::N(n) => AttributeValue::N(n),
            Wire::B(b) => AttributeValue::B(BASE64.decode(b)?),
            Wire::Bool(b) => AttributeValue::Bool(b),
            Wire::Null(_) => AttributeValue::Null,
            Wire::Ss(ss) => AttributeValue::Ss(ss),
            Wire::Ns(ns) => AttributeValue::Ns(ns),
            Wire::Bs(bs) => AttributeValue::Bs(
                bs.iter()
                    .map(|b| BASE64.decode(b))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            Wire::L(list) => AttributeValue::L(list),
            Wire::M(map) => AttributeValue::M(map),
        })
    }
}

impl From<AttributeValue> for SdkAttributeValue {
    fn from(av: AttributeValue) -> Self {
        match av {
            AttributeValue::S(s) => SdkAttributeValue::S(s),
            AttributeValue::N(n) => SdkAttributeValue::N(n),
            AttributeValue::B(b) => SdkAttributeValue::B(Blob::new(b)),
            AttributeValue::Bool(b) => SdkAttributeValue::Bool(b),
            AttributeValue::Null => SdkAttributeValue::Null(true),
            AttributeValue::Ss(ss) => SdkAttributeValue::Ss(ss),
            AttributeValue::Ns(ns) => SdkAttributeValue::Ns(ns),
            AttributeValue::Bs(bs) => SdkAttributeValue::Bs(bs.into_iter().map(Blob::new).collect()),
            AttributeValue::L(list) => {
                SdkAttributeValue::L(list.into_iter().map(SdkAttributeValue::from).collect())
            }
            AttributeValue::M(map) => SdkAttributeValue::M(item_to_sdk(map)),
        }
    }
}

impl TryFrom<SdkAttributeValue> for AttributeValue {
    type Error = Error;

    fn try_from(av: SdkAttributeValue) -> Result<Self> {
        Ok(match av {
            SdkAttributeValue::S(s) => AttributeValue::S(s),
            SdkAttributeValue::N(n) => AttributeValue::N(n),
            SdkAttributeValue::B(b) => AttributeValue::B(b.into_inner()),
            SdkAttributeValue::Bool(b) => AttributeValue::Bool(b),
            SdkAttributeValue::Null(_) => AttributeValue::Null,
            SdkAttributeValue::Ss(ss) => AttributeValue::Ss(ss),
            SdkAttributeValue::Ns(ns) => AttributeValue::Ns(ns),
            SdkAttributeValue::Bs(bs) => {
                AttributeValue::Bs(bs.into_iter().map(Blob::into_inner).collect())
            }
            SdkAttributeValue::L(list) => AttributeValue::L(
                list.into_iter()
                    .map(AttributeValue::try_from)
                    .collect::<Result<_>>()?,
            ),
            SdkAttributeValue::M(map) => AttributeValue::M(item_from_sdk(map)?),
            _ => return Err(Error::UnknownAttributeValue),
        })
    }
}

/// Convert an item into the SDK's representation.
pub fn item_to_sdk(item: Item) -> HashMap<String, SdkAttributeValue> {
    item.into_iter().map(|(k, v)| (k, v.into())).collect()
}

/// Convert an item returned by the SDK.
///
/// Fails on attribute variants this crate does not know about.
pub fn item_from_sdk(item: HashMap<String, SdkAttributeValue>) -> Result<Item> {
    item.into_iter()
        .map(|(k, v)| Ok((k, AttributeValue::try_from(v)?)))
        .collect()
}
