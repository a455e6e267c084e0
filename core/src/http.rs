//! HTTP data types exchanged with the transport.
//!
//! # Design
//! These types describe requests and responses as plain data. The core
//! assembles an `HttpRequest` and hands it to a `Transport`; the transport
//! performs the I/O and reports back with an `HttpResponse`. The core never
//! touches the network itself, which keeps dispatch deterministic and easy
//! to drive from a stub in tests.
//!
//! All fields use owned types (`String`, `Vec`) so values move freely between
//! the dispatcher, filters and transport threads.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::headers::{Headers, CONTENT_TYPE};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully assembled request, as seen by request filters and the transport.
///
/// Filters may rewrite any field before the transport receives it.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Correlation id, also recorded on the dispatch log lines.
    pub id: Uuid,
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
    /// Forwarded to the transport, which owns timeout enforcement.
    pub timeout: Option<Duration>,
    pub user: Option<String>,
    pub password: Option<String>,
}

/// A response described as plain data.
///
/// Constructed by the transport after executing an `HttpRequest`; response
/// filters may rewrite it before the dispatcher evaluates the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    /// First header value with a matching name, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Upload or download progress reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl Progress {
    /// Fraction in `[0, 1]`, or `None` when the total size is unknown.
    pub fn completed_fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.loaded as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}
