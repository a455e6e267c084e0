//! Container abstraction for collection-shaped responses.
//!
//! # Design
//! A caller asks for a collection response as a concrete container type
//! (`Vec<T>`, `BTreeSet<T>`, a custom type, ...). Deserializers never name
//! that type: they push decoded items through the object-safe `Container`
//! trait into an empty instance the dispatcher obtains from the
//! `ContainerFactoryRegistry`.
//!
//! Factories are keyed by the container's `TypeId`. Container types that
//! implement `Default` (every std collection) are always constructible, so
//! the std kinds behave as pre-registered; an explicit registration
//! overrides the default construction for that type.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::registration::Registration;

/// Sink a deserializer pushes decoded items into.
pub trait Container<T> {
    fn add(&mut self, item: T);
}

impl<T, C: Extend<T>> Container<T> for C {
    fn add(&mut self, item: T) {
        self.extend(std::iter::once(item));
    }
}

/// Zero-argument constructor for an empty container.
pub type ContainerFactory<C> = Arc<dyn Fn() -> C + Send + Sync>;

type Factories = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Registry of container factories, shared by every request of a client.
#[derive(Clone, Default)]
pub struct ContainerFactoryRegistry {
    factories: Arc<RwLock<Factories>>,
}

impl ContainerFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` for container type `C`, replacing any earlier one.
    pub fn register<C, F>(&self, factory: F) -> Registration
    where
        C: Any,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let key = TypeId::of::<C>();
        let factory: ContainerFactory<C> = Arc::new(factory);
        let stored: Arc<dyn Any + Send + Sync> = Arc::new(factory);
        self.factories.write().insert(key, Arc::clone(&stored));

        let weak: Weak<RwLock<Factories>> = Arc::downgrade(&self.factories);
        Registration::new(move || {
            if let Some(factories) = weak.upgrade() {
                let mut factories = factories.write();
                // Only remove the entry this handle installed.
                if factories.get(&key).is_some_and(|current| Arc::ptr_eq(current, &stored)) {
                    factories.remove(&key);
                }
            }
        })
    }

    /// Explicitly registered factory for `C`, if any.
    ///
    /// Default-constructible kinds report `None` here until something is
    /// registered for them; use [`factory`](Self::factory) to resolve the
    /// factory a request would actually use.
    pub fn lookup<C: Any>(&self) -> Option<ContainerFactory<C>> {
        self.factories
            .read()
            .get(&TypeId::of::<C>())
            .and_then(|stored| stored.downcast_ref::<ContainerFactory<C>>())
            .cloned()
    }

    /// Factory for `C`: the registered one, else `C::default`.
    pub fn factory<C: Any + Default>(&self) -> ContainerFactory<C> {
        self.lookup::<C>().unwrap_or_else(|| Arc::new(C::default))
    }

    /// Empty instance of `C` from its registered factory, or `C::default()`.
    pub fn instantiate<C: Any + Default>(&self) -> C {
        match self.lookup::<C>() {
            Some(factory) => factory(),
            None => C::default(),
        }
    }
}

impl std::fmt::Debug for ContainerFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerFactoryRegistry")
            .field("registered", &self.factories.read().len())
            .finish()
    }
}
