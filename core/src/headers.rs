//! Request header model.
//!
//! # Design
//! Headers are kept as an ordered `Vec` rather than a map: insertion order is
//! significant for multi-valued headers and is what the transport sees.
//! Setting a header whose name is already present (case-insensitive)
//! replaces it in place, keeping its original position.
//!
//! Structured headers (`Content-Type`, `Accept` and other quality-factor
//! headers) keep their parsed values next to the rendered string form so
//! filters can inspect them without re-parsing.

use std::fmt;

use crate::error::RequestError;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const ACCEPT: &str = "Accept";

/// One entry of a quality-factor header such as `Accept`.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityValue {
    value: String,
    factor: f64,
}

impl QualityValue {
    /// Value with an explicit quality factor in `[0, 1]`.
    pub fn new(value: &str, factor: f64) -> Result<Self, RequestError> {
        if !(0.0..=1.0).contains(&factor) {
            return Err(RequestError::invalid("quality factor must be between 0 and 1"));
        }
        if value.is_empty() {
            return Err(RequestError::invalid("quality value cannot be empty"));
        }
        Ok(Self {
            value: value.to_string(),
            factor,
        })
    }

    /// Value with the implicit factor of 1.
    pub fn of(value: &str) -> Result<Self, RequestError> {
        Self::new(value, 1.0)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl fmt::Display for QualityValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.factor == 1.0 {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{};q={}", self.value, self.factor)
        }
    }
}

/// A single request header.
#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    Simple { name: String, value: String },
    ContentType(String),
    /// Values are sorted by descending factor; equal factors keep their
    /// registration order.
    QualityFactor { name: String, values: Vec<QualityValue> },
}

impl Header {
    pub fn simple(name: &str, value: &str) -> Self {
        Header::Simple {
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn content_type(content_type: &str) -> Self {
        Header::ContentType(content_type.to_string())
    }

    /// `Accept` header from a single media range with factor 1.
    pub fn accept(media_range: &str) -> Self {
        Header::QualityFactor {
            name: ACCEPT.to_string(),
            values: vec![QualityValue {
                value: media_range.to_string(),
                factor: 1.0,
            }],
        }
    }

    /// Quality-factor header such as `Accept`, `Accept-Language` or
    /// `Accept-Encoding`.
    pub fn quality_factor(name: &str, values: impl IntoIterator<Item = QualityValue>) -> Self {
        let mut values: Vec<QualityValue> = values.into_iter().collect();
        values.sort_by(|a, b| b.factor.total_cmp(&a.factor));
        Header::QualityFactor {
            name: name.to_string(),
            values,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Header::Simple { name, .. } => name,
            Header::ContentType(_) => CONTENT_TYPE,
            Header::QualityFactor { name, .. } => name,
        }
    }

    /// Rendered wire value.
    pub fn value(&self) -> String {
        match self {
            Header::Simple { value, .. } => value.clone(),
            Header::ContentType(content_type) => content_type.clone(),
            Header::QualityFactor { values, .. } => values
                .iter()
                .map(QualityValue::to_string)
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// Ordered header collection of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `header`, replacing any header with the same name in place.
    pub fn set(&mut self, header: Header) {
        match self
            .entries
            .iter_mut()
            .find(|h| h.name().eq_ignore_ascii_case(header.name()))
        {
            Some(existing) => *existing = header,
            None => self.entries.push(header),
        }
    }

    /// Insert `header` only when no header with that name exists yet.
    pub fn set_if_absent(&mut self, header: Header) {
        if !self.contains(header.name()) {
            self.entries.push(header);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Header> {
        self.entries.iter().find(|h| h.name().eq_ignore_ascii_case(name))
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.get(name).map(Header::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Header> {
        let index = self
            .entries
            .iter()
            .position(|h| h.name().eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    /// Name/value pairs in insertion order, as handed to the transport.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|h| (h.name().to_string(), h.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_same_name_in_place() {
        let mut headers = Headers::new();
        headers.set(Header::simple("X-First", "1"));
        headers.set(Header::simple("X-Second", "2"));
        headers.set(Header::simple("x-first", "3"));

        assert_eq!(
            headers.to_pairs(),
            vec![
                ("x-first".to_string(), "3".to_string()),
                ("X-Second".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn set_if_absent_keeps_existing_value() {
        let mut headers = Headers::new();
        headers.set(Header::content_type("text/plain"));
        headers.set_if_absent(Header::content_type("application/json"));
        assert_eq!(headers.value("content-type").as_deref(), Some("text/plain"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn quality_factor_values_sorted_by_descending_factor() {
        let header = Header::quality_factor(
            ACCEPT,
            [
                QualityValue::new("text/plain", 0.5).unwrap(),
                QualityValue::of("application/json").unwrap(),
                QualityValue::new("text/html", 0.5).unwrap(),
                QualityValue::new("*/*", 0.1).unwrap(),
            ],
        );
        assert_eq!(
            header.value(),
            "application/json, text/plain;q=0.5, text/html;q=0.5, */*;q=0.1"
        );
    }

    #[test]
    fn quality_value_rejects_out_of_range_factor() {
        assert!(QualityValue::new("text/plain", 1.5).is_err());
        assert!(QualityValue::new("text/plain", -0.1).is_err());
        assert!(QualityValue::new("text/plain", f64::NAN).is_err());
        assert!(QualityValue::new("", 0.5).is_err());
    }

    #[test]
    fn remove_returns_the_header() {
        let mut headers = Headers::new();
        headers.set(Header::accept("application/json"));
        let removed = headers.remove("ACCEPT").unwrap();
        assert_eq!(removed.value(), "application/json");
        assert!(headers.is_empty());
    }
}
