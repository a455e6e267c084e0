//! Error types for the requestor core.
//!
//! # Design
//! One `RequestError` enum covers every way a request can fail, so a single
//! fail-observer sees all of them. Variants map onto the failure kinds a
//! caller needs to tell apart: bad builder arguments, serdes negotiation
//! misses, non-2xx responses, transport failures and misuse of a settled
//! deferred. The enum is `Clone` because one outcome is handed to many
//! observers.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crate::http::HttpResponse;

/// Errors surfaced by builders, registries and the dispatcher.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// A builder or registry argument was rejected at the call site.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No serializer matches the payload type and request content type.
    #[error("no serializer registered for {type_name} with content type {content_type}")]
    NoSerializer {
        type_name: &'static str,
        content_type: String,
    },

    /// No deserializer matches the response type and response content type.
    #[error("no deserializer registered for {type_name} with content type {content_type}")]
    NoDeserializer {
        type_name: &'static str,
        content_type: String,
    },

    /// A serializer was found but failed to encode the payload.
    #[error("unable to serialize {type_name}: {detail}")]
    Serialization {
        type_name: &'static str,
        detail: String,
    },

    /// A deserializer was found but failed to decode the response body.
    #[error("unable to deserialize response of content type {content_type}: {detail}")]
    Deserialization { content_type: String, detail: String },

    /// The server answered with a status outside 2xx.
    #[error("unsuccessful response: {} {}", .0.status, .0.status_text)]
    UnsuccessfulResponse(Box<HttpResponse>),

    /// The transport failed before a response was received.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A deferred was resolved or rejected after reaching a terminal state.
    #[error("deferred already settled")]
    AlreadySettled,
}

impl RequestError {
    /// Status code of an unsuccessful response, if this is one.
    pub fn status(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    /// The full response carried by an unsuccessful-response failure.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            RequestError::UnsuccessfulResponse(response) => Some(&**response),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, RequestError::Transport(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RequestError::InvalidArgument(msg.into())
    }
}

/// Failures reported by a `Transport` before any response arrives.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The configured timeout elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The remote host could not be reached.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The transport gave up on the request for another reason.
    #[error("request aborted: {0}")]
    Aborted(String),

    #[error("io error: {0}")]
    Io(Arc<io::Error>),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

/// Failure reported by a serializer or deserializer implementation.
///
/// The dispatcher wraps it into `RequestError::Serialization` or
/// `RequestError::Deserialization`, adding the type and content type.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct SerdesError(pub String);

impl SerdesError {
    pub fn new(detail: impl Into<String>) -> Self {
        SerdesError(detail.into())
    }
}

impl From<serde_json::Error> for SerdesError {
    fn from(err: serde_json::Error) -> Self {
        SerdesError(err.to_string())
    }
}
