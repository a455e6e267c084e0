//! The `Requestor` client facade.
//!
//! # Design
//! A `Requestor` owns one transport and one set of registries (serdes,
//! container factories, filters). Nothing is global: two requestors with
//! different registrations coexist and can be tested in isolation.
//! Registries are internally reference-counted, so the request builders a
//! requestor hands out share them without borrowing the requestor.
//!
//! Every requestor starts with the built-in serdes installed: JSON for the
//! scalar types and `serde_json::Value`, plain text and void fallbacks, and
//! the form serializer.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::config::RequestorConfig;
use crate::container::ContainerFactoryRegistry;
use crate::error::RequestError;
use crate::filter::{FilterManager, RequestFilter, ResponseFilter};
use crate::registration::Registration;
use crate::request::RequestBuilder;
use crate::serdes::{
    Deserializer, FormSerializer, JsonSerdes, Serdes, SerdesRegistry, Serializer, TextDeserializer,
    VoidSerdes,
};
use crate::transport::Transport;
use crate::uri::UriBuilder;

/// Collaborators shared by a requestor and every builder it creates.
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) serdes: SerdesRegistry,
    pub(crate) containers: ContainerFactoryRegistry,
    pub(crate) filters: FilterManager,
}

/// Entry point for building and sending requests.
#[derive(Clone)]
pub struct Requestor {
    services: Services,
    config: Arc<RequestorConfig>,
}

impl Requestor {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_config(transport, RequestorConfig::default())
    }

    pub fn with_config(transport: impl Transport + 'static, config: RequestorConfig) -> Self {
        let services = Services {
            transport: Arc::new(transport),
            serdes: SerdesRegistry::new(),
            containers: ContainerFactoryRegistry::new(),
            filters: FilterManager::new(),
        };
        install_builtin_serdes(&services.serdes);
        Self {
            services,
            config: Arc::new(config),
        }
    }

    /// Start a request to a literal URI. URIs starting with `/` are
    /// prefixed with the configured base url.
    pub fn request(&self, uri: &str) -> RequestBuilder {
        RequestBuilder::to_uri(self.services.clone(), Arc::clone(&self.config), uri)
    }

    /// Start a request to a URI assembled with a `UriBuilder`.
    pub fn request_to(&self, uri: UriBuilder) -> RequestBuilder {
        RequestBuilder::to_builder(self.services.clone(), Arc::clone(&self.config), uri)
    }

    pub fn config(&self) -> &RequestorConfig {
        &self.config
    }

    pub fn default_content_type(&self) -> &str {
        &self.config.default_content_type
    }

    /// Change the content type of requests created from now on.
    pub fn set_default_content_type(&mut self, content_type: &str) -> Result<(), RequestError> {
        if content_type.trim().is_empty() {
            return Err(RequestError::invalid("default content type cannot be empty"));
        }
        Arc::make_mut(&mut self.config).default_content_type = content_type.to_string();
        Ok(())
    }

    pub fn default_accept(&self) -> &str {
        &self.config.default_accept
    }

    /// Change the accept value of requests created from now on.
    pub fn set_default_accept(&mut self, accept: &str) -> Result<(), RequestError> {
        if accept.trim().is_empty() {
            return Err(RequestError::invalid("default accept cannot be empty"));
        }
        Arc::make_mut(&mut self.config).default_accept = accept.to_string();
        Ok(())
    }

    pub fn register_serdes<T, S>(&self, serdes: S) -> Result<Registration, RequestError>
    where
        T: 'static,
        S: Serdes<T> + 'static,
    {
        self.services.serdes.register_serdes::<T, S>(serdes)
    }

    pub fn register_serializer<T, S>(&self, serializer: S) -> Result<Registration, RequestError>
    where
        T: 'static,
        S: Serializer<T> + 'static,
    {
        self.services.serdes.register_serializer::<T, S>(serializer)
    }

    pub fn register_deserializer<T, D>(&self, deserializer: D) -> Result<Registration, RequestError>
    where
        T: 'static,
        D: Deserializer<T> + 'static,
    {
        self.services.serdes.register_deserializer::<T, D>(deserializer)
    }

    /// Register `JsonSerdes<T>` for a serde-enabled type.
    pub fn register_json<T>(&self) -> Result<Registration, RequestError>
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.services.serdes.register_serdes::<T, _>(JsonSerdes::<T>::new())
    }

    pub fn register_container_factory<C, F>(&self, factory: F) -> Registration
    where
        C: 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.services.containers.register::<C, F>(factory)
    }

    pub fn register_request_filter(&self, filter: impl RequestFilter + 'static) -> Registration {
        self.services.filters.add_request_filter(filter)
    }

    pub fn register_response_filter(&self, filter: impl ResponseFilter + 'static) -> Registration {
        self.services.filters.add_response_filter(filter)
    }

    pub fn serdes(&self) -> &SerdesRegistry {
        &self.services.serdes
    }

    pub fn containers(&self) -> &ContainerFactoryRegistry {
        &self.services.containers
    }

    pub fn filters(&self) -> &FilterManager {
        &self.services.filters
    }
}

impl std::fmt::Debug for Requestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requestor")
            .field("config", &self.config)
            .field("serdes", &self.services.serdes)
            .field("filters", &self.services.filters)
            .finish_non_exhaustive()
    }
}

fn install_builtin_serdes(serdes: &SerdesRegistry) {
    let results = [
        serdes.register_serdes::<String, _>(JsonSerdes::<String>::new()),
        serdes.register_serdes::<bool, _>(JsonSerdes::<bool>::new()),
        serdes.register_serdes::<i32, _>(JsonSerdes::<i32>::new()),
        serdes.register_serdes::<i64, _>(JsonSerdes::<i64>::new()),
        serdes.register_serdes::<u32, _>(JsonSerdes::<u32>::new()),
        serdes.register_serdes::<u64, _>(JsonSerdes::<u64>::new()),
        serdes.register_serdes::<f32, _>(JsonSerdes::<f32>::new()),
        serdes.register_serdes::<f64, _>(JsonSerdes::<f64>::new()),
        serdes.register_serdes::<serde_json::Value, _>(JsonSerdes::<serde_json::Value>::new()),
        serdes.register_deserializer::<String, _>(TextDeserializer),
        serdes.register_serdes::<(), _>(VoidSerdes),
        serdes.register_serializer::<crate::serdes::FormParam, _>(FormSerializer),
        serdes.register_serializer::<crate::serdes::FormData, _>(FormSerializer),
    ];
    for result in results {
        // Built-ins stay registered for the life of the requestor; their
        // handles are dropped.
        if let Err(err) = result {
            warn!(error = %err, "failed to install built-in serdes");
        }
    }
}
