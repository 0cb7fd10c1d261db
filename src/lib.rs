//! # dynamo-mapper
//!
//! Struct-annotation driven DynamoDB mapping.
//!
//! This crate handles:
//! - Marshaling Rust values to DynamoDB attribute values and back
//! - Deriving CreateTable requests (keys, indexes, projections) from the
//!   same annotations
//! - Retrying throttled calls against aws-sdk-dynamodb with backoff
//!
//! Records are declared with [`record!`]; types with their own encoding
//! use [`marshaler!`] or [`text_marshaler!`].

mod macros;

pub mod attribute;
pub mod client;
pub mod errors;
pub mod marshal;
pub mod retry;
pub mod table_operations;
pub mod tag;
pub mod time;
pub mod unmarshal;
pub mod value;

pub use attribute::{item_from_sdk, item_to_sdk, AttributeValue, Item};
pub use client::{build_client, ClientConfig, Db, Transport};
pub use errors::{Error, Result, TransportError, TransportErrorKind};
pub use marshal::{is_zero, marshal, marshal_item};
pub use retry::{can_retry, with_retry, with_retry_until, RetryPolicy};
pub use table_operations::{type_of, CreateTable, Index};
pub use time::UnixTime;
pub use unmarshal::{
    unmarshal, unmarshal_append, unmarshal_item, FieldMut, RecordMut, TextUnmarshaler,
    Unmarshal, Unmarshaler,
};
pub use value::{
    Field, FieldDescriptor, FieldSpec, Kind, Marshal, Marshaler, Record, Repr, TextMarshaler,
};

pub use aws_sdk_dynamodb::types::{
    ProjectionType, ScalarAttributeType, SseType, StreamViewType, TableStatus,
};
pub use tokio_util::sync::CancellationToken;
