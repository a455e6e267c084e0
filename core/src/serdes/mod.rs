//! Serializer and deserializer contracts, and content-type matching.
//!
//! # Design
//! A serializer turns a value of one Rust type into a body for a set of
//! content-type patterns; a deserializer does the reverse. Both are
//! generic over the handled type and stored in the `SerdesRegistry` keyed
//! by `TypeId`, so negotiation is a lookup on (type, content type).
//!
//! Patterns are media ranges: exact (`application/json`), single wildcard
//! (`*/json`, `application/*`) or full wildcard (`*/*`). A more specific
//! pattern always beats a less specific one; see `match_specificity`.
//!
//! Collections never go through a separate trait: `serialize_collection`
//! receives a slice, and `deserialize_into` pushes items into a
//! caller-chosen `Container`.

mod form;
mod json;
mod registry;

pub use form::{FormData, FormParam, FormSerializer};
pub use json::{JsonSerdes, TextDeserializer, VoidSerdes};
pub use registry::SerdesRegistry;

use crate::container::{Container, ContainerFactoryRegistry};
use crate::error::SerdesError;
use crate::headers::Headers;
use crate::http::HttpResponse;

/// Encodes values of `T` into request bodies.
pub trait Serializer<T>: Send + Sync {
    /// Content-type patterns this serializer produces.
    fn content_types(&self) -> &[&str];

    fn handled_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn serialize(&self, value: &T, ctx: &SerializationContext<'_>) -> Result<String, SerdesError>;

    fn serialize_collection(
        &self,
        values: &[T],
        ctx: &SerializationContext<'_>,
    ) -> Result<String, SerdesError>;
}

/// Decodes response bodies into values of `T`.
pub trait Deserializer<T>: Send + Sync {
    /// Content-type patterns this deserializer accepts.
    fn accept(&self) -> &[&str];

    fn handled_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn deserialize(&self, body: &str, ctx: &DeserializationContext<'_>) -> Result<T, SerdesError>;

    /// Decode a collection body, adding every item to `container`.
    fn deserialize_into(
        &self,
        body: &str,
        container: &mut dyn Container<T>,
        ctx: &DeserializationContext<'_>,
    ) -> Result<(), SerdesError>;
}

/// A type that both serializes and deserializes `T`.
pub trait Serdes<T>: Serializer<T> + Deserializer<T> {}

impl<T, S: Serializer<T> + Deserializer<T>> Serdes<T> for S {}

/// Request-side information available while serializing.
#[derive(Debug)]
pub struct SerializationContext<'a> {
    content_type: &'a str,
    headers: &'a Headers,
}

impl<'a> SerializationContext<'a> {
    pub(crate) fn new(content_type: &'a str, headers: &'a Headers) -> Self {
        Self {
            content_type,
            headers,
        }
    }

    /// Content type the body is being encoded for.
    pub fn content_type(&self) -> &str {
        self.content_type
    }

    pub fn headers(&self) -> &Headers {
        self.headers
    }
}

/// Response-side information available while deserializing.
#[derive(Debug)]
pub struct DeserializationContext<'a> {
    content_type: &'a str,
    response: &'a HttpResponse,
    containers: &'a ContainerFactoryRegistry,
}

impl<'a> DeserializationContext<'a> {
    pub(crate) fn new(
        content_type: &'a str,
        response: &'a HttpResponse,
        containers: &'a ContainerFactoryRegistry,
    ) -> Self {
        Self {
            content_type,
            response,
            containers,
        }
    }

    pub fn content_type(&self) -> &str {
        self.content_type
    }

    pub fn response(&self) -> &HttpResponse {
        self.response
    }

    /// Container factories, for deserializers that build nested collections.
    pub fn containers(&self) -> &ContainerFactoryRegistry {
        self.containers
    }
}

/// Media type without parameters, lowercased: `Application/JSON; charset=utf-8`
/// becomes `application/json`.
pub fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// How specifically `pattern` matches `content_type`.
///
/// Returns `None` when it does not match, `Some(2)` for an exact match,
/// `Some(1)` for a single wildcard (`*/json`, `application/*`) and `Some(0)`
/// for `*/*`. A missing content type (empty string) is matched only by `*/*`.
pub fn match_specificity(pattern: &str, content_type: &str) -> Option<u8> {
    let pattern = media_type(pattern);
    if pattern == "*/*" || pattern == "*" {
        return Some(0);
    }
    let content_type = media_type(content_type);
    let (ct_type, ct_sub) = content_type.split_once('/')?;
    let (p_type, p_sub) = pattern.split_once('/')?;

    match (p_type, p_sub) {
        ("*", sub) if sub == ct_sub => Some(1),
        (ty, "*") if ty == ct_type => Some(1),
        (ty, sub) if ty == ct_type && sub == ct_sub => Some(2),
        _ => None,
    }
}

/// Best specificity of any pattern in `patterns` against `content_type`.
pub(crate) fn best_match<S: AsRef<str>>(patterns: &[S], content_type: &str) -> Option<u8> {
    patterns
        .iter()
        .filter_map(|p| match_specificity(p.as_ref(), content_type))
        .max()
}
