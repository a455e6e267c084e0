//! Handles returned by registry registrations.

use std::fmt;

/// Undo handle for a serdes, filter or container factory registration.
///
/// Dropping the handle keeps the registration in place; call `remove` to
/// take it out. Handles hold only weak references, so removing after the
/// owning registry is gone is a no-op.
#[must_use = "dropping a Registration keeps the entry registered; call remove() to undo it"]
pub struct Registration {
    remover: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Registration {
    pub(crate) fn new(remover: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            remover: Some(Box::new(remover)),
        }
    }

    /// Combine two handles into one that removes both.
    pub(crate) fn and(mut self, mut other: Registration) -> Self {
        let first = self.remover.take();
        let second = other.remover.take();
        Registration::new(move || {
            if let Some(remove) = first {
                remove();
            }
            if let Some(remove) = second {
                remove();
            }
        })
    }

    pub fn remove(mut self) {
        if let Some(remove) = self.remover.take() {
            remove();
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.remover.is_some())
            .finish()
    }
}
