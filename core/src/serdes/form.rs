//! `application/x-www-form-urlencoded` payloads.

use std::fmt;
use std::sync::Arc;

use super::{SerializationContext, Serializer};
use crate::error::SerdesError;
use crate::uri::{MultivaluedParamStrategy, RepeatedParam};

const FORM_PATTERNS: &[&str] = &["application/x-www-form-urlencoded"];

/// One form field with one or more values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormParam {
    name: String,
    values: Vec<String>,
}

impl FormParam {
    pub fn new<I>(name: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        Self {
            name: name.to_string(),
            values: values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// An ordered set of form fields sharing one multi-value strategy.
#[derive(Debug, Clone)]
pub struct FormData {
    params: Vec<FormParam>,
    strategy: Arc<dyn MultivaluedParamStrategy>,
}

impl Default for FormData {
    fn default() -> Self {
        Self {
            params: Vec::new(),
            strategy: Arc::new(RepeatedParam),
        }
    }
}

impl FormData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field; putting a name that is already present replaces its
    /// values and keeps its position.
    pub fn put<I>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let param = FormParam::new(name, values);
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
        self
    }

    pub fn strategy(mut self, strategy: impl MultivaluedParamStrategy + 'static) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    pub fn params(&self) -> &[FormParam] {
        &self.params
    }

    fn encode(&self) -> String {
        encode_params(&self.params, self.strategy.as_ref())
    }
}

fn encode_params(params: &[FormParam], strategy: &dyn MultivaluedParamStrategy) -> String {
    params
        .iter()
        .filter(|p| !p.values.is_empty())
        .map(|p| strategy.as_uri_part("&", &p.name, &p.values))
        .collect::<Vec<_>>()
        .join("&")
}

/// Serializer for `FormParam` and `FormData` payloads.
///
/// Bare `FormParam` payloads repeat the key for multiple values; `FormData`
/// uses its own strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct FormSerializer;

impl Serializer<FormParam> for FormSerializer {
    fn content_types(&self) -> &[&str] {
        FORM_PATTERNS
    }

    fn serialize(&self, value: &FormParam, _: &SerializationContext<'_>) -> Result<String, SerdesError> {
        Ok(encode_params(std::slice::from_ref(value), &RepeatedParam))
    }

    fn serialize_collection(
        &self,
        values: &[FormParam],
        _: &SerializationContext<'_>,
    ) -> Result<String, SerdesError> {
        Ok(encode_params(values, &RepeatedParam))
    }
}

impl Serializer<FormData> for FormSerializer {
    fn content_types(&self) -> &[&str] {
        FORM_PATTERNS
    }

    fn serialize(&self, value: &FormData, _: &SerializationContext<'_>) -> Result<String, SerdesError> {
        Ok(value.encode())
    }

    fn serialize_collection(
        &self,
        values: &[FormData],
        _: &SerializationContext<'_>,
    ) -> Result<String, SerdesError> {
        Ok(values
            .iter()
            .map(FormData::encode)
            .filter(|encoded| !encoded.is_empty())
            .collect::<Vec<_>>()
            .join("&"))
    }
}
