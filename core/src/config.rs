//! Client-wide defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;

pub const DEFAULT_MEDIA_TYPE: &str = "application/json";

/// Defaults applied to every request of a `Requestor` unless the request
/// overrides them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestorConfig {
    pub default_content_type: String,
    pub default_accept: String,
    pub default_timeout_ms: Option<u64>,
    /// Prefix for request URIs starting with `/`.
    pub base_url: Option<String>,
}

impl Default for RequestorConfig {
    fn default() -> Self {
        Self {
            default_content_type: DEFAULT_MEDIA_TYPE.to_string(),
            default_accept: DEFAULT_MEDIA_TYPE.to_string(),
            default_timeout_ms: None,
            base_url: None,
        }
    }
}

impl RequestorConfig {
    pub fn from_json(json: &str) -> Result<Self, RequestError> {
        let config: RequestorConfig = serde_json::from_str(json)
            .map_err(|e| RequestError::invalid(format!("invalid requestor configuration: {e}")))?;
        config.validated()
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self.normalized()
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }

    /// Prefix `uri` with the base url when it is relative to the server root.
    pub(crate) fn resolve(&self, uri: &str) -> String {
        match &self.base_url {
            Some(base) if uri.starts_with('/') => format!("{base}{uri}"),
            _ => uri.to_string(),
        }
    }

    fn normalized(mut self) -> Self {
        if let Some(base) = &mut self.base_url {
            let trimmed = base.trim_end_matches('/').len();
            base.truncate(trimmed);
        }
        self
    }

    fn validated(self) -> Result<Self, RequestError> {
        if self.default_content_type.trim().is_empty() {
            return Err(RequestError::invalid("default content type cannot be empty"));
        }
        if self.default_accept.trim().is_empty() {
            return Err(RequestError::invalid("default accept cannot be empty"));
        }
        Ok(self.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_json_both_ways() {
        let config = RequestorConfig::default();
        assert_eq!(config.default_content_type, "application/json");
        assert_eq!(config.default_accept, "application/json");
        assert!(config.default_timeout().is_none());
    }

    #[test]
    fn from_json_fills_missing_fields_and_strips_base_slash() {
        let config = RequestorConfig::from_json(
            r#"{"base_url": "http://localhost:3000/", "default_timeout_ms": 2500}"#,
        )
        .unwrap();
        assert_eq!(config.base_url.as_deref(), Some("http://localhost:3000"));
        assert_eq!(config.default_timeout(), Some(Duration::from_millis(2500)));
        assert_eq!(config.default_accept, "application/json");
        assert_eq!(config.resolve("/books"), "http://localhost:3000/books");
        assert_eq!(config.resolve("http://other/x"), "http://other/x");
    }

    #[test]
    fn from_json_rejects_blank_content_type() {
        let err = RequestorConfig::from_json(r#"{"default_content_type": " "}"#).unwrap_err();
        assert!(matches!(err, RequestError::InvalidArgument(_)));
        assert!(RequestorConfig::from_json("not json").is_err());
    }
}
