//! Request and response filters.
//!
//! # Design
//! Filters are held in registration order and exposed to the dispatcher as
//! an immutable snapshot (`Arc<[...]>`). Every add or remove rebuilds the
//! snapshot under the write lock, so a dispatch that already took its
//! snapshot keeps running over the same filters even if the set changes
//! underneath it.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::http::{HttpRequest, HttpResponse};
use crate::registration::Registration;

/// Rewrites an outgoing request before it reaches the transport.
pub trait RequestFilter: Send + Sync {
    fn filter(&self, request: &mut HttpRequest);
}

impl<F: Fn(&mut HttpRequest) + Send + Sync> RequestFilter for F {
    fn filter(&self, request: &mut HttpRequest) {
        self(request)
    }
}

/// Rewrites an incoming response before its status is evaluated.
pub trait ResponseFilter: Send + Sync {
    fn filter(&self, response: &mut HttpResponse);
}

impl<F: Fn(&mut HttpResponse) + Send + Sync> ResponseFilter for F {
    fn filter(&self, response: &mut HttpResponse) {
        self(response)
    }
}

pub type RequestFilters = Arc<[Arc<dyn RequestFilter>]>;
pub type ResponseFilters = Arc<[Arc<dyn ResponseFilter>]>;

struct Chain<F: ?Sized> {
    entries: Vec<(u64, Arc<F>)>,
    snapshot: Arc<[Arc<F>]>,
}

impl<F: ?Sized> Default for Chain<F> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            snapshot: Arc::from(Vec::new()),
        }
    }
}

impl<F: ?Sized> Chain<F> {
    fn push(&mut self, id: u64, filter: Arc<F>) {
        self.entries.push((id, filter));
        self.rebuild();
    }

    fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry, _)| *entry != id);
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.snapshot = self.entries.iter().map(|(_, f)| Arc::clone(f)).collect();
    }
}

#[derive(Default)]
struct Chains {
    next_id: u64,
    request: Chain<dyn RequestFilter>,
    response: Chain<dyn ResponseFilter>,
}

/// Ordered request and response filter chains of one client.
#[derive(Clone, Default)]
pub struct FilterManager {
    chains: Arc<RwLock<Chains>>,
}

impl FilterManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_request_filter(&self, filter: impl RequestFilter + 'static) -> Registration {
        let id = {
            let mut chains = self.chains.write();
            let id = chains.next_id;
            chains.next_id += 1;
            chains.request.push(id, Arc::new(filter));
            id
        };
        let weak = Arc::downgrade(&self.chains);
        Registration::new(move || {
            if let Some(chains) = Weak::upgrade(&weak) {
                chains.write().request.remove(id);
            }
        })
    }

    pub fn add_response_filter(&self, filter: impl ResponseFilter + 'static) -> Registration {
        let id = {
            let mut chains = self.chains.write();
            let id = chains.next_id;
            chains.next_id += 1;
            chains.response.push(id, Arc::new(filter));
            id
        };
        let weak = Arc::downgrade(&self.chains);
        Registration::new(move || {
            if let Some(chains) = Weak::upgrade(&weak) {
                chains.write().response.remove(id);
            }
        })
    }

    /// Current request filters, in registration order.
    pub fn request_filters(&self) -> RequestFilters {
        Arc::clone(&self.chains.read().request.snapshot)
    }

    /// Current response filters, in registration order.
    pub fn response_filters(&self) -> ResponseFilters {
        Arc::clone(&self.chains.read().response.snapshot)
    }
}

impl std::fmt::Debug for FilterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let chains = self.chains.read();
        f.debug_struct("FilterManager")
            .field("request_filters", &chains.request.entries.len())
            .field("response_filters", &chains.response.entries.len())
            .finish()
    }
}
