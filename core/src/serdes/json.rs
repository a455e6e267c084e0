//! Built-in serdes: JSON via serde, plain text and the empty body.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{DeserializationContext, Deserializer, SerializationContext, Serializer};
use crate::container::Container;
use crate::error::SerdesError;

const JSON_PATTERNS: &[&str] = &["application/json", "*/json"];
const TEXT_PATTERNS: &[&str] = &["text/plain", "*/*"];
const ANY_PATTERNS: &[&str] = &["*/*"];

/// JSON serdes for any serde-enabled type.
///
/// Collections are encoded as JSON arrays; a collection body that is not an
/// array fails to deserialize.
pub struct JsonSerdes<T> {
    _type: PhantomData<fn() -> T>,
}

impl<T> JsonSerdes<T> {
    pub fn new() -> Self {
        Self { _type: PhantomData }
    }
}

impl<T> Default for JsonSerdes<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Serialize> Serializer<T> for JsonSerdes<T> {
    fn content_types(&self) -> &[&str] {
        JSON_PATTERNS
    }

    fn serialize(&self, value: &T, _: &SerializationContext<'_>) -> Result<String, SerdesError> {
        Ok(serde_json::to_string(value)?)
    }

    fn serialize_collection(
        &self,
        values: &[T],
        _: &SerializationContext<'_>,
    ) -> Result<String, SerdesError> {
        Ok(serde_json::to_string(values)?)
    }
}

impl<T: DeserializeOwned> Deserializer<T> for JsonSerdes<T> {
    fn accept(&self) -> &[&str] {
        JSON_PATTERNS
    }

    fn deserialize(&self, body: &str, _: &DeserializationContext<'_>) -> Result<T, SerdesError> {
        Ok(serde_json::from_str(body)?)
    }

    fn deserialize_into(
        &self,
        body: &str,
        container: &mut dyn Container<T>,
        _: &DeserializationContext<'_>,
    ) -> Result<(), SerdesError> {
        let value: serde_json::Value = serde_json::from_str(body)?;
        let serde_json::Value::Array(items) = value else {
            return Err(SerdesError::new("response content is not a JSON array"));
        };
        for item in items {
            container.add(serde_json::from_value(item)?);
        }
        Ok(())
    }
}

/// Passes a text body through as a `String`.
///
/// Accepts `text/plain` exactly and anything else as a fallback. A
/// collection body yields one item per non-empty line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDeserializer;

impl Deserializer<String> for TextDeserializer {
    fn accept(&self) -> &[&str] {
        TEXT_PATTERNS
    }

    fn deserialize(&self, body: &str, _: &DeserializationContext<'_>) -> Result<String, SerdesError> {
        Ok(body.to_string())
    }

    fn deserialize_into(
        &self,
        body: &str,
        container: &mut dyn Container<String>,
        _: &DeserializationContext<'_>,
    ) -> Result<(), SerdesError> {
        for line in body.lines().filter(|l| !l.trim().is_empty()) {
            container.add(line.to_string());
        }
        Ok(())
    }
}

/// Serdes for `()`: writes an empty body and ignores any body it reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct VoidSerdes;

impl Serializer<()> for VoidSerdes {
    fn content_types(&self) -> &[&str] {
        ANY_PATTERNS
    }

    fn serialize(&self, _: &(), _: &SerializationContext<'_>) -> Result<String, SerdesError> {
        Ok(String::new())
    }

    fn serialize_collection(&self, _: &[()], _: &SerializationContext<'_>) -> Result<String, SerdesError> {
        Ok(String::new())
    }
}

impl Deserializer<()> for VoidSerdes {
    fn accept(&self) -> &[&str] {
        ANY_PATTERNS
    }

    fn deserialize(&self, _: &str, _: &DeserializationContext<'_>) -> Result<(), SerdesError> {
        Ok(())
    }

    fn deserialize_into(
        &self,
        _: &str,
        _: &mut dyn Container<()>,
        _: &DeserializationContext<'_>,
    ) -> Result<(), SerdesError> {
        Ok(())
    }
}
