//! Incremental URI composition.
//!
//! # Design
//! `UriBuilder` stores every URI part separately and renders them only in
//! `build`. Path segments are an ordered list; each segment owns its matrix
//! parameters, so a parameter can only ever attach to the segment that was
//! last appended when it was registered.
//!
//! Multi-valued parameters are rendered through a `MultivaluedParamStrategy`.
//! The strategy active at registration time is stored with each parameter,
//! so switching strategy mid-build affects only parameters registered after
//! the switch.

use std::fmt;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::RequestError;

/// Characters escaped inside a whole path; `/` is kept as the separator.
const PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Segment values additionally escape `%` and `;` (the matrix delimiter).
const SEGMENT: &AsciiSet = &PATH.add(b'%').add(b';');

/// Query and matrix parameter names and values.
const PARAM: &AsciiSet = &SEGMENT
    .add(b'&')
    .add(b'=')
    .add(b'+')
    .add(b',')
    .add(b'/')
    .add(b'[')
    .add(b']');

/// Userinfo keeps `:` (user:password) but escapes everything that would end
/// the authority early.
const USERINFO: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'@')
    .add(b'%')
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']');

const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

/// Percent-encode a single query/matrix/form component.
pub fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, PARAM).to_string()
}

/// Policy for rendering one parameter name with one or more values.
///
/// Implementations return an already URI-encoded fragment. `separator` is
/// the delimiter between parameters in the surrounding context (`&` for
/// query strings and form bodies, `;` for matrix parameters).
pub trait MultivaluedParamStrategy: Send + Sync + fmt::Debug {
    fn as_uri_part(&self, separator: &str, name: &str, values: &[String]) -> String;
}

/// Repeats the key for every value: `a=1&a=2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepeatedParam;

impl MultivaluedParamStrategy for RepeatedParam {
    fn as_uri_part(&self, separator: &str, name: &str, values: &[String]) -> String {
        let name = encode_component(name);
        values
            .iter()
            .map(|value| format!("{name}={}", encode_component(value)))
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Joins all values under one key: `a=1,2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommaSeparated;

impl MultivaluedParamStrategy for CommaSeparated {
    fn as_uri_part(&self, _separator: &str, name: &str, values: &[String]) -> String {
        let joined = values
            .iter()
            .map(|value| encode_component(value))
            .collect::<Vec<_>>()
            .join(",");
        format!("{}={joined}", encode_component(name))
    }
}

#[derive(Debug, Clone)]
struct Param {
    name: String,
    values: Vec<String>,
    strategy: Arc<dyn MultivaluedParamStrategy>,
}

impl Param {
    fn render(&self, separator: &str) -> String {
        self.strategy.as_uri_part(separator, &self.name, &self.values)
    }
}

#[derive(Debug, Clone)]
struct Segment {
    value: String,
    matrix: Vec<Param>,
}

/// Builder for request URIs.
///
/// ```
/// use requestor_core::UriBuilder;
///
/// let uri = UriBuilder::new()
///     .path("/server")
///     .segment("books").unwrap()
///     .matrix_param("v", ["1"]).unwrap()
///     .query_param("q", ["x"]).unwrap()
///     .build();
/// assert_eq!(uri, "/server/books;v=1?q=x");
/// ```
#[derive(Debug, Clone)]
pub struct UriBuilder {
    strategy: Arc<dyn MultivaluedParamStrategy>,
    scheme: Option<String>,
    user_info: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    path: String,
    segments: Vec<Segment>,
    query: Vec<Param>,
    fragment: Option<String>,
}

impl Default for UriBuilder {
    fn default() -> Self {
        Self {
            strategy: Arc::new(RepeatedParam),
            scheme: None,
            user_info: None,
            host: None,
            port: None,
            path: "/".to_string(),
            segments: Vec::new(),
            query: Vec::new(),
            fragment: None,
        }
    }
}

impl UriBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strategy applied to parameters registered from now on.
    pub fn multivalued_param_strategy(
        mut self,
        strategy: impl MultivaluedParamStrategy + 'static,
    ) -> Self {
        self.strategy = Arc::new(strategy);
        self
    }

    /// Set or unset (`None`) the scheme.
    pub fn scheme<'a>(mut self, scheme: impl Into<Option<&'a str>>) -> Result<Self, RequestError> {
        self.scheme = match scheme.into() {
            None => None,
            Some(scheme) => {
                let mut chars = scheme.chars();
                let valid_start = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
                let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
                if !valid_start || !valid_rest {
                    return Err(RequestError::invalid(format!("invalid scheme: {scheme:?}")));
                }
                Some(scheme.to_string())
            }
        };
        Ok(self)
    }

    pub fn user_info<'a>(mut self, user_info: impl Into<Option<&'a str>>) -> Self {
        self.user_info = user_info.into().map(str::to_string);
        self
    }

    pub fn host<'a>(mut self, host: impl Into<Option<&'a str>>) -> Self {
        self.host = host.into().map(str::to_string);
        self
    }

    pub fn port(mut self, port: impl Into<Option<u16>>) -> Self {
        self.port = port.into();
        self
    }

    /// Replace the whole path and drop previously appended segments.
    /// An empty path resets it to `/`.
    pub fn path(mut self, path: &str) -> Self {
        self.path = if path.is_empty() {
            "/".to_string()
        } else {
            utf8_percent_encode(&format_segment(path), PATH).to_string()
        };
        self.segments.clear();
        self
    }

    /// Append one path segment.
    pub fn segment(mut self, segment: impl fmt::Display) -> Result<Self, RequestError> {
        let value = segment.to_string();
        if value.is_empty() {
            return Err(RequestError::invalid("segment cannot be empty"));
        }
        self.segments.push(Segment {
            value,
            matrix: Vec::new(),
        });
        Ok(self)
    }

    /// Append several path segments; each one is validated on its own.
    pub fn segments<I>(self, segments: I) -> Result<Self, RequestError>
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        segments.into_iter().try_fold(self, |builder, s| builder.segment(s))
    }

    /// Bind a matrix parameter to the most recently appended segment.
    pub fn matrix_param<I>(mut self, name: &str, values: I) -> Result<Self, RequestError>
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let param = self.param(name, values)?;
        let segment = self.segments.last_mut().ok_or_else(|| {
            RequestError::invalid("matrix parameters need at least one segment to bind to")
        })?;
        upsert(&mut segment.matrix, param);
        Ok(self)
    }

    /// Register a query parameter; registering the same name again replaces
    /// the earlier values.
    pub fn query_param<I>(mut self, name: &str, values: I) -> Result<Self, RequestError>
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        let param = self.param(name, values)?;
        upsert(&mut self.query, param);
        Ok(self)
    }

    pub fn fragment<'a>(mut self, fragment: impl Into<Option<&'a str>>) -> Self {
        self.fragment = fragment.into().map(str::to_string);
        self
    }

    /// Render the URI string.
    pub fn build(&self) -> String {
        let mut uri = String::new();

        if let Some(scheme) = &self.scheme {
            uri.push_str(scheme);
            uri.push_str("://");
        }
        if let Some(user_info) = &self.user_info {
            uri.push_str(&utf8_percent_encode(user_info, USERINFO).to_string());
            uri.push('@');
        }
        if let Some(host) = &self.host {
            uri.push_str(host);
        }
        if let Some(port) = self.port {
            uri.push(':');
            uri.push_str(&port.to_string());
        }

        uri.push_str(&self.path);

        if !self.segments.is_empty() {
            if uri.ends_with('/') {
                uri.pop();
            }
            for segment in &self.segments {
                let formatted = format_segment(&segment.value);
                uri.push_str(&utf8_percent_encode(&formatted, SEGMENT).to_string());
                for param in &segment.matrix {
                    uri.push(';');
                    uri.push_str(&param.render(";"));
                }
            }
        }

        if !self.query.is_empty() {
            uri.push('?');
            let rendered: Vec<String> = self.query.iter().map(|p| p.render("&")).collect();
            uri.push_str(&rendered.join("&"));
        }

        if let Some(fragment) = &self.fragment {
            uri.push('#');
            uri.push_str(&utf8_percent_encode(fragment, FRAGMENT).to_string());
        }

        uri
    }

    fn param<I>(&self, name: &str, values: I) -> Result<Param, RequestError>
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        if name.is_empty() {
            return Err(RequestError::invalid("parameter name cannot be empty"));
        }
        let values: Vec<String> = values.into_iter().map(|v| v.to_string()).collect();
        if values.is_empty() {
            return Err(RequestError::invalid(format!("parameter {name:?} needs at least one value")));
        }
        Ok(Param {
            name: name.to_string(),
            values,
            strategy: Arc::clone(&self.strategy),
        })
    }
}

fn upsert(params: &mut Vec<Param>, param: Param) {
    match params.iter_mut().find(|p| p.name == param.name) {
        Some(existing) => *existing = param,
        None => params.push(param),
    }
}

/// Leading `/`, no trailing `/`.
fn format_segment(segment: &str) -> String {
    let trimmed = segment.strip_suffix('/').unwrap_or(segment);
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
