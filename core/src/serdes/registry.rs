//! Type-keyed registry of serializers and deserializers.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::debug;

use super::{best_match, media_type, Deserializer, Serdes, Serializer};
use crate::error::RequestError;
use crate::registration::Registration;

struct Entry {
    id: u64,
    patterns: Vec<String>,
    /// `Arc<dyn Serializer<T>>` or `Arc<dyn Deserializer<T>>`, erased.
    handler: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Tables {
    next_id: u64,
    serializers: HashMap<TypeId, Vec<Entry>>,
    deserializers: HashMap<TypeId, Vec<Entry>>,
}

#[derive(Clone, Copy)]
enum Side {
    Serializer,
    Deserializer,
}

impl Tables {
    fn side(&mut self, side: Side) -> &mut HashMap<TypeId, Vec<Entry>> {
        match side {
            Side::Serializer => &mut self.serializers,
            Side::Deserializer => &mut self.deserializers,
        }
    }
}

/// Registry the dispatcher negotiates serdes through.
///
/// Lookups pick, among the entries registered for the requested type, the
/// one whose patterns match the content type most specifically. When two
/// entries tie, the one registered last wins.
#[derive(Clone, Default)]
pub struct SerdesRegistry {
    tables: Arc<RwLock<Tables>>,
}

impl SerdesRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_serializer<T, S>(&self, serializer: S) -> Result<Registration, RequestError>
    where
        T: 'static,
        S: Serializer<T> + 'static,
    {
        let patterns = validate_patterns(serializer.content_types())?;
        let handler: Arc<dyn Serializer<T>> = Arc::new(serializer);
        Ok(self.insert::<T>(Side::Serializer, patterns, Box::new(handler)))
    }

    pub fn register_deserializer<T, D>(&self, deserializer: D) -> Result<Registration, RequestError>
    where
        T: 'static,
        D: Deserializer<T> + 'static,
    {
        let patterns = validate_patterns(deserializer.accept())?;
        let handler: Arc<dyn Deserializer<T>> = Arc::new(deserializer);
        Ok(self.insert::<T>(Side::Deserializer, patterns, Box::new(handler)))
    }

    /// Register one value as both serializer and deserializer of `T`. The
    /// returned handle removes both sides.
    pub fn register_serdes<T, S>(&self, serdes: S) -> Result<Registration, RequestError>
    where
        T: 'static,
        S: Serdes<T> + 'static,
    {
        let produced = validate_patterns(<S as Serializer<T>>::content_types(&serdes))?;
        let accepted = validate_patterns(<S as Deserializer<T>>::accept(&serdes))?;
        let serdes = Arc::new(serdes);
        let serializer: Arc<dyn Serializer<T>> = serdes.clone();
        let deserializer: Arc<dyn Deserializer<T>> = serdes;
        let first = self.insert::<T>(Side::Serializer, produced, Box::new(serializer));
        let second = self.insert::<T>(Side::Deserializer, accepted, Box::new(deserializer));
        Ok(first.and(second))
    }

    /// Most specific serializer of `T` for `content_type`.
    pub fn serializer<T: 'static>(
        &self,
        content_type: &str,
    ) -> Result<Arc<dyn Serializer<T>>, RequestError> {
        let tables = self.tables.read();
        lookup::<Arc<dyn Serializer<T>>>(tables.serializers.get(&TypeId::of::<T>()), content_type)
            .ok_or_else(|| RequestError::NoSerializer {
                type_name: type_name::<T>(),
                content_type: content_type.to_string(),
            })
    }

    /// Most specific deserializer of `T` for `content_type`.
    pub fn deserializer<T: 'static>(
        &self,
        content_type: &str,
    ) -> Result<Arc<dyn Deserializer<T>>, RequestError> {
        let tables = self.tables.read();
        lookup::<Arc<dyn Deserializer<T>>>(tables.deserializers.get(&TypeId::of::<T>()), content_type)
            .ok_or_else(|| RequestError::NoDeserializer {
                type_name: type_name::<T>(),
                content_type: content_type.to_string(),
            })
    }

    fn insert<T: 'static>(
        &self,
        side: Side,
        patterns: Vec<String>,
        handler: Box<dyn Any + Send + Sync>,
    ) -> Registration {
        let key = TypeId::of::<T>();
        let id = {
            let mut tables = self.tables.write();
            let id = tables.next_id;
            tables.next_id += 1;
            debug!(type_name = type_name::<T>(), ?patterns, "registering serdes");
            tables.side(side).entry(key).or_default().push(Entry {
                id,
                patterns,
                handler,
            });
            id
        };

        let weak: Weak<RwLock<Tables>> = Arc::downgrade(&self.tables);
        Registration::new(move || {
            if let Some(tables) = weak.upgrade() {
                let mut tables = tables.write();
                if let Some(entries) = tables.side(side).get_mut(&key) {
                    entries.retain(|e| e.id != id);
                }
            }
        })
    }
}

impl std::fmt::Debug for SerdesRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("SerdesRegistry")
            .field("serializer_types", &tables.serializers.len())
            .field("deserializer_types", &tables.deserializers.len())
            .finish()
    }
}

fn validate_patterns(patterns: &[&str]) -> Result<Vec<String>, RequestError> {
    if patterns.is_empty() {
        return Err(RequestError::invalid("serdes must declare at least one content-type pattern"));
    }
    let normalized: Vec<String> = patterns.iter().map(|p| media_type(p)).collect();
    if normalized.iter().any(|p| p.is_empty()) {
        return Err(RequestError::invalid("content-type pattern cannot be empty"));
    }
    Ok(normalized)
}

fn lookup<H: Clone + 'static>(entries: Option<&Vec<Entry>>, content_type: &str) -> Option<H> {
    entries?
        .iter()
        .filter_map(|entry| best_match(&entry.patterns, content_type).map(|rank| (rank, entry)))
        // max_by_key keeps the last maximum, i.e. the latest registration.
        .max_by_key(|(rank, _)| *rank)
        .and_then(|(_, entry)| entry.handler.downcast_ref::<H>())
        .cloned()
}
