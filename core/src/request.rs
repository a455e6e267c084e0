//! Request builder and dispatcher.
//!
//! # Design
//! A `RequestBuilder` accumulates everything about one request (target,
//! headers, content negotiation, credentials, timeout, payload and
//! status-scoped callbacks) and is consumed by `send`. The builder is
//! `Clone`: cloning is how a partially configured request is forked into
//! siblings that differ in payload or response type.
//!
//! The payload type is fixed when the payload is set and the response type
//! when the request is sent, so both are captured as closures over the
//! concrete type rather than as type parameters of the builder.
//!
//! Dispatch runs in this order: serialize the payload, fill default
//! `Content-Type` and `Accept`, run the request filter snapshot, hand the
//! request to the transport. The response path runs the response filter
//! snapshot taken at dispatch time, then settles the deferred.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::client::Services;
use crate::config::RequestorConfig;
use crate::container::Container;
use crate::deferred::{Deferred, Outcome};
use crate::error::{RequestError, SerdesError, TransportError};
use crate::filter::ResponseFilters;
use crate::headers::{Header, Headers, CONTENT_TYPE};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::serdes::{DeserializationContext, SerdesRegistry, SerializationContext};
use crate::transport::ResponseCallback;
use crate::uri::UriBuilder;

/// Body sent for an empty collection payload, whose element serializer
/// cannot be chosen from the items.
pub const EMPTY_COLLECTION: &str = "[]";

type Encoder =
    Arc<dyn Fn(&SerdesRegistry, &SerializationContext<'_>) -> Result<String, RequestError> + Send + Sync>;
type ScopedCallback = Arc<dyn Fn(&HttpResponse) + Send + Sync>;

fn encoder<F>(encode: F) -> Encoder
where
    F: Fn(&SerdesRegistry, &SerializationContext<'_>) -> Result<String, RequestError> + Send + Sync + 'static,
{
    Arc::new(encode)
}

#[derive(Debug, Clone)]
enum Target {
    Fixed(String),
    Built(UriBuilder),
}

/// Builder for one request of a `Requestor`.
#[derive(Clone)]
pub struct RequestBuilder {
    services: Services,
    config: Arc<RequestorConfig>,
    target: Target,
    headers: Headers,
    content_type: String,
    accept: String,
    timeout: Option<Duration>,
    user: Option<String>,
    password: Option<String>,
    payload: Option<Encoder>,
    scoped: Vec<(u16, ScopedCallback)>,
}

impl RequestBuilder {
    pub(crate) fn to_uri(services: Services, config: Arc<RequestorConfig>, uri: &str) -> Self {
        Self::new(services, config, Target::Fixed(uri.to_string()))
    }

    pub(crate) fn to_builder(services: Services, config: Arc<RequestorConfig>, uri: UriBuilder) -> Self {
        Self::new(services, config, Target::Built(uri))
    }

    fn new(services: Services, config: Arc<RequestorConfig>, target: Target) -> Self {
        Self {
            content_type: config.default_content_type.clone(),
            accept: config.default_accept.clone(),
            timeout: config.default_timeout(),
            services,
            config,
            target,
            headers: Headers::new(),
            user: None,
            password: None,
            payload: None,
            scoped: Vec::new(),
        }
    }

    /// Content type used to pick the payload serializer and sent as
    /// `Content-Type`.
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = content_type.to_string();
        self
    }

    /// Media range sent as `Accept` unless an explicit `Accept` header is set.
    pub fn accept(mut self, accept: &str) -> Self {
        self.accept = accept.to_string();
        self
    }

    /// Set a header. Explicit `Content-Type` and `Accept` headers take
    /// precedence over the negotiated defaults.
    pub fn header(mut self, header: Header) -> Self {
        self.headers.set(header);
        self
    }

    pub fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Timeout forwarded to the transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `callback` instead of the done/fail observers when the response
    /// status starts with `code`. Only the most specific matching code runs.
    pub fn on(mut self, code: u16, callback: impl Fn(&HttpResponse) + Send + Sync + 'static) -> Self {
        let callback: ScopedCallback = Arc::new(callback);
        match self.scoped.iter_mut().find(|(c, _)| *c == code) {
            Some(existing) => existing.1 = callback,
            None => self.scoped.push((code, callback)),
        }
        self
    }

    /// Single-value payload, serialized by the serializer registered for `P`.
    pub fn payload<P: Send + Sync + 'static>(mut self, value: P) -> Self {
        self.payload = Some(encoder(move |serdes, ctx| {
            let serializer = serdes.serializer::<P>(ctx.content_type())?;
            serializer
                .serialize(&value, ctx)
                .map_err(serialization_error::<P>)
        }));
        self
    }

    /// Collection payload. An empty collection is sent as `[]` without
    /// consulting any serializer.
    pub fn payload_collection<P, I>(mut self, items: I) -> Self
    where
        P: Send + Sync + 'static,
        I: IntoIterator<Item = P>,
    {
        let items: Vec<P> = items.into_iter().collect();
        self.payload = Some(encoder(move |serdes, ctx| {
            if items.is_empty() {
                return Ok(EMPTY_COLLECTION.to_string());
            }
            let serializer = serdes.serializer::<P>(ctx.content_type())?;
            serializer
                .serialize_collection(&items, ctx)
                .map_err(serialization_error::<P>)
        }));
        self
    }

    /// The URI this request will be sent to.
    pub fn uri(&self) -> String {
        match &self.target {
            Target::Fixed(uri) => self.config.resolve(uri),
            Target::Built(builder) => self.config.resolve(&builder.build()),
        }
    }

    /// Serialize the payload and fill default headers, producing the
    /// request as request filters will first see it.
    pub fn prepare(&self, method: HttpMethod) -> Result<HttpRequest, RequestError> {
        let mut headers = self.headers.clone();
        let body = match &self.payload {
            Some(encode) => {
                let content_type = headers
                    .value(CONTENT_TYPE)
                    .unwrap_or_else(|| self.content_type.clone());
                let ctx = SerializationContext::new(&content_type, &headers);
                Some(encode(&self.services.serdes, &ctx)?)
            }
            None => None,
        };
        headers.set_if_absent(Header::content_type(&self.content_type));
        headers.set_if_absent(Header::accept(&self.accept));

        Ok(HttpRequest {
            id: Uuid::new_v4(),
            method,
            url: self.uri(),
            headers,
            body,
            timeout: self.timeout,
            user: self.user.clone(),
            password: self.password.clone(),
        })
    }

    /// Send the request, resolving with a single value of type `R`.
    ///
    /// With `R = HttpResponse` the deferred resolves with the raw (filtered)
    /// response instead of a deserialized body.
    pub fn send<R: Send + Sync + 'static>(self, method: HttpMethod) -> Result<Deferred<R>, RequestError> {
        self.dispatch(method, decode_value::<R>)
    }

    /// Send the request, resolving with the items of a collection body
    /// collected into container `C`.
    pub fn send_collection<R, C>(self, method: HttpMethod) -> Result<Deferred<C>, RequestError>
    where
        R: 'static,
        C: Container<R> + Default + Send + Sync + 'static,
    {
        self.dispatch(method, decode_collection::<R, C>)
    }

    pub fn get<R: Send + Sync + 'static>(self) -> Result<Deferred<R>, RequestError> {
        self.send(HttpMethod::Get)
    }

    pub fn post<R: Send + Sync + 'static>(self) -> Result<Deferred<R>, RequestError> {
        self.send(HttpMethod::Post)
    }

    pub fn put<R: Send + Sync + 'static>(self) -> Result<Deferred<R>, RequestError> {
        self.send(HttpMethod::Put)
    }

    pub fn delete<R: Send + Sync + 'static>(self) -> Result<Deferred<R>, RequestError> {
        self.send(HttpMethod::Delete)
    }

    pub fn head(self) -> Result<Deferred<HttpResponse>, RequestError> {
        self.send(HttpMethod::Head)
    }

    fn dispatch<R, D>(self, method: HttpMethod, decode: D) -> Result<Deferred<R>, RequestError>
    where
        R: Send + Sync + 'static,
        D: FnOnce(&Services, &HttpResponse) -> Result<Option<R>, RequestError> + Send + 'static,
    {
        let mut request = self.prepare(method)?;

        let deferred = Deferred::new();
        for (code, callback) in &self.scoped {
            let callback = Arc::clone(callback);
            deferred.on(*code, move |completion| {
                if let Some(response) = completion.response() {
                    callback(response);
                }
            });
        }

        for filter in self.services.filters.request_filters().iter() {
            filter.filter(&mut request);
        }
        let response_filters = self.services.filters.response_filters();

        let id = request.id;
        debug!(request_id = %id, method = %request.method, url = %request.url, "dispatching request");

        let on_progress = {
            let deferred = deferred.clone();
            move |progress| {
                if deferred.notify(progress).is_err() {
                    trace!(request_id = %id, "progress after completion dropped");
                }
            }
        };
        let on_terminal = {
            let deferred = deferred.clone();
            let services = self.services.clone();
            move |result| complete(&services, &deferred, &response_filters, decode, id, result)
        };

        if let Err(err) = self
            .services
            .transport
            .send(request, ResponseCallback::new(on_terminal, on_progress))
        {
            debug!(request_id = %id, error = %err, "transport could not dispatch request");
            if deferred.reject(RequestError::Transport(err)).is_err() {
                warn!(request_id = %id, "transport reported a dispatch error after completing the request");
            }
        }
        Ok(deferred)
    }
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("uri", &self.uri())
            .field("content_type", &self.content_type)
            .field("accept", &self.accept)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

fn complete<R, D>(
    services: &Services,
    deferred: &Deferred<R>,
    response_filters: &ResponseFilters,
    decode: D,
    id: Uuid,
    result: Result<HttpResponse, TransportError>,
) where
    R: Send + Sync + 'static,
    D: FnOnce(&Services, &HttpResponse) -> Result<Option<R>, RequestError>,
{
    let mut response = match result {
        Ok(response) => response,
        Err(err) => {
            debug!(request_id = %id, error = %err, "transport failed");
            if deferred.reject(RequestError::Transport(err)).is_err() {
                warn!(request_id = %id, "transport error for an already completed request");
            }
            return;
        }
    };

    for filter in response_filters.iter() {
        filter.filter(&mut response);
    }
    debug!(request_id = %id, status = response.status, "response received");

    let outcome = if deferred.intercepts(response.status) {
        // The scoped callback replaces value delivery; no body is decoded.
        if response.is_success() {
            Outcome::Resolved(None)
        } else {
            Outcome::Rejected(unsuccessful(&response))
        }
    } else if response.is_success() {
        match decode(services, &response) {
            Ok(value) => Outcome::Resolved(value),
            Err(err) => Outcome::Rejected(err),
        }
    } else {
        debug!(request_id = %id, status = response.status, "unsuccessful response");
        Outcome::Rejected(unsuccessful(&response))
    };

    if deferred.settle(outcome, Some(response)).is_err() {
        warn!(request_id = %id, "response arrived for an already completed request");
    }
}

fn unsuccessful(response: &HttpResponse) -> RequestError {
    RequestError::UnsuccessfulResponse(Box::new(response.clone()))
}

fn serialization_error<P>(err: SerdesError) -> RequestError {
    RequestError::Serialization {
        type_name: type_name::<P>(),
        detail: err.to_string(),
    }
}

fn deserialization_error(content_type: &str, err: SerdesError) -> RequestError {
    RequestError::Deserialization {
        content_type: content_type.to_string(),
        detail: err.to_string(),
    }
}

fn raw_response<R: 'static>(response: &HttpResponse) -> Option<R> {
    if TypeId::of::<R>() != TypeId::of::<HttpResponse>() {
        return None;
    }
    let raw: Box<dyn Any> = Box::new(response.clone());
    raw.downcast::<R>().ok().map(|raw| *raw)
}

fn decode_value<R: 'static>(services: &Services, response: &HttpResponse) -> Result<Option<R>, RequestError> {
    if let Some(raw) = raw_response::<R>(response) {
        return Ok(Some(raw));
    }
    if response.body.is_empty() {
        return Ok(None);
    }
    let content_type = response.content_type().unwrap_or_default();
    let deserializer = services.serdes.deserializer::<R>(content_type)?;
    let ctx = DeserializationContext::new(content_type, response, &services.containers);
    deserializer
        .deserialize(&response.body, &ctx)
        .map(Some)
        .map_err(|err| deserialization_error(content_type, err))
}

fn decode_collection<R, C>(services: &Services, response: &HttpResponse) -> Result<Option<C>, RequestError>
where
    R: 'static,
    C: Container<R> + Default + 'static,
{
    if response.body.is_empty() {
        return Ok(None);
    }
    let content_type = response.content_type().unwrap_or_default();
    let deserializer = services.serdes.deserializer::<R>(content_type)?;
    let ctx = DeserializationContext::new(content_type, response, &services.containers);
    let mut container: C = services.containers.instantiate();
    deserializer
        .deserialize_into(&response.body, &mut container, &ctx)
        .map_err(|err| deserialization_error(content_type, err))?;
    Ok(Some(container))
}
