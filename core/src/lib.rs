//! Fluent HTTP request core with pluggable serialization and transport.
//!
//! # Overview
//! A `Requestor` builds requests, negotiates serializers and deserializers
//! by Rust type and content type, runs request and response filters, and
//! reports each outcome through a `Deferred`. The actual HTTP round-trip is
//! delegated to a `Transport` implementation supplied by the host, so the
//! core itself performs no I/O (host-does-IO pattern).
//!
//! # Design
//! - Registries (serdes, container factories, filters) are explicit values
//!   owned by one `Requestor`; there is no global state.
//! - Request and response types are chosen per call through generics
//!   (`send::<R>`, `send_collection::<R, C>`) instead of one method per
//!   payload shape.
//! - `Deferred` is a single-assignment result with observer lists, settled
//!   exactly once even when completion sources race.
//! - Logging goes through `tracing`; the library never installs a
//!   subscriber.

pub mod client;
pub mod config;
pub mod container;
pub mod deferred;
pub mod error;
pub mod filter;
pub mod headers;
pub mod http;
pub mod registration;
pub mod request;
pub mod serdes;
pub mod transport;
pub mod uri;

pub use client::Requestor;
pub use config::RequestorConfig;
pub use container::{Container, ContainerFactoryRegistry};
pub use deferred::{Completion, Deferred, Outcome, State};
pub use error::{RequestError, SerdesError, TransportError};
pub use filter::{FilterManager, RequestFilter, ResponseFilter};
pub use headers::{Header, Headers, QualityValue};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Progress};
pub use registration::Registration;
pub use request::RequestBuilder;
pub use serdes::{
    DeserializationContext, Deserializer, FormData, FormParam, JsonSerdes, SerializationContext,
    Serdes, SerdesRegistry, Serializer,
};
pub use transport::{ResponseCallback, Transport};
pub use uri::{CommaSeparated, MultivaluedParamStrategy, RepeatedParam, UriBuilder};
