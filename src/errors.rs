//! Error types for dynamo-mapper.
//!
//! Marshaling, decoding and schema construction share a single [`Error`]
//! enum. Failures coming back from DynamoDB are carried as a
//! [`TransportError`], which keeps the HTTP status and the service error
//! code intact so the retry shim can classify them.

use aws_sdk_dynamodb::config::http::HttpResponse;
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::fmt;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every error the crate can produce.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("dynamo marshal: map key must be string, got {0}")]
    UnsupportedMapKey(&'static str),

    #[error("dynamo marshal: unknown type for sets: {0}")]
    InvalidSet(String),

    #[error("dynamo marshal: cannot encode non-finite number {0}")]
    NonFiniteNumber(f64),

    #[error("dynamo marshal: item must be a struct or a map, got {0}")]
    NotAnItem(&'static str),

    #[error("dynamo: CreateTable example must be a struct")]
    NotAStruct,

    #[error("dynamo: invalid type for key: {0}")]
    InvalidKeyType(String),

    #[error("dynamo: conflicting types for key {name}: {existing} and {requested}")]
    ConflictingKeyType {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("dynamo: no such index: {0}")]
    NoSuchIndex(String),

    #[error("dynamo: table {0} has no hash key")]
    MissingHashKey(String),

    #[error("dynamo: index {0} has no key schema")]
    EmptyIndex(String),

    #[error("dynamo: invalid request: {0}")]
    Build(#[from] BuildError),

    #[error("dynamo unmarshal: cannot decode {found} into {target}")]
    Mismatch {
        found: &'static str,
        target: &'static str,
    },

    #[error("dynamo unmarshal: invalid number {value:?} for {target}")]
    InvalidNumber { value: String, target: &'static str },

    #[error("dynamo: invalid base64 binary: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("dynamo: unknown attribute value variant")]
    UnknownAttributeValue,

    #[error("dynamo unmarshal: invalid time {value:?}")]
    InvalidTime {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Raised by user supplied marshalers.
    #[error("{0}")]
    Custom(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("dynamo: operation canceled")]
    Canceled,

    #[error("dynamo: deadline exceeded")]
    DeadlineExceeded,
}

impl Error {
    /// Build an error from a custom marshaler's message.
    pub fn custom(msg: impl fmt::Display) -> Self {
        Error::Custom(msg.to_string())
    }
}

/// Broad classification of a service error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    TableNotFound,
    TableAlreadyExists,
    Validation,
    Throttling,
    AccessDenied,
    Credentials,
    Other,
}

/// A failed call to DynamoDB.
///
/// The original status and error code are preserved; retrying never wraps
/// or rewrites them.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    status: Option<u16>,
    code: Option<String>,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(status: Option<u16>, code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.map(str::to_string),
            message: message.into(),
            source: None,
        }
    }

    /// HTTP status of the response, if one was received.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Service error code such as `ThrottlingException`.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the retry shim should try the call again.
    pub fn is_retryable(&self) -> bool {
        crate::retry::can_retry(self.status, self.code())
    }

    /// Map the service error code to a coarse kind.
    pub fn kind(&self) -> TransportErrorKind {
        match self.code() {
            Some("ResourceNotFoundException") => TransportErrorKind::TableNotFound,
            Some("ResourceInUseException") => TransportErrorKind::TableAlreadyExists,
            Some("ValidationException") | Some("ItemCollectionSizeLimitExceededException") => {
                TransportErrorKind::Validation
            }
            Some("ProvisionedThroughputExceededException")
            | Some("ThrottlingException")
            | Some("RequestLimitExceeded") => TransportErrorKind::Throttling,
            Some("AccessDeniedException") => TransportErrorKind::AccessDenied,
            Some("UnrecognizedClientException")
            | Some("InvalidSignatureException")
            | Some("ExpiredTokenException")
            | Some("MissingAuthenticationTokenException") => TransportErrorKind::Credentials,
            _ => TransportErrorKind::Other,
        }
    }
}

impl<E> From<SdkError<E, HttpResponse>> for TransportError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    fn from(err: SdkError<E, HttpResponse>) -> Self {
        let status = err.raw_response().map(|raw| raw.status().as_u16());
        let (code, message) = match err.as_service_error() {
            Some(service) => (
                service.code().map(str::to_string),
                service.message().map(str::to_string),
            ),
            None => (None, None),
        };
        let message = message.unwrap_or_else(|| DisplayErrorContext(&err).to_string());
        Self {
            status,
            code,
            message,
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_code() {
        let cases = [
            ("ResourceNotFoundException", TransportErrorKind::TableNotFound),
            ("ResourceInUseException", TransportErrorKind::TableAlreadyExists),
            ("ValidationException", TransportErrorKind::Validation),
            ("ThrottlingException", TransportErrorKind::Throttling),
            ("AccessDeniedException", TransportErrorKind::AccessDenied),
            ("UnrecognizedClientException", TransportErrorKind::Credentials),
            ("SomethingElse", TransportErrorKind::Other),
        ];
        for (code, kind) in cases {
            let err = TransportError::new(Some(400), Some(code), "boom");
            assert_eq!(err.kind(), kind, "{code}");
        }
    }

    #[test]
    fn transport_error_keeps_message() {
        let err: Error = TransportError::new(Some(500), None, "internal failure").into();
        assert_eq!(err.to_string(), "internal failure");
        match err {
            Error::Transport(inner) => assert_eq!(inner.status(), Some(500)),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
