//! Application-wide service registry used as the ambient fallback.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;

/// Type-erased service handle. Always holds an `Arc<T>` for the registered `T`.
pub(crate) type ServiceHandle = Box<dyn Any + Send + Sync>;

pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(service: Arc<T>) -> ServiceHandle {
    Box::new(service)
}

pub(crate) fn downcast<T: ?Sized + Send + Sync + 'static>(handle: &ServiceHandle) -> Option<Arc<T>> {
    handle.downcast_ref::<Arc<T>>().cloned()
}

/// A statically typed lookup of application-wide services.
///
/// Units of work consult it only after their own participants and service
/// factories, so anything registered here is shared by every unit of work
/// built from the same manager.
///
/// ```ignore
/// let mut ambient = ServiceRegistry::new();
/// ambient.insert::<dyn Clock>(Arc::new(SystemClock));
/// let clock = ambient.get::<dyn Clock>().unwrap();
/// ```
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, (&'static str, ServiceHandle)>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service, replacing any previous registration for `T`.
    pub fn insert<T: ?Sized + Send + Sync + 'static>(&mut self, service: Arc<T>) -> &mut Self {
        self.services
            .insert(TypeId::of::<T>(), (type_name::<T>(), erase(service)));
        self
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.insert(service);
        self
    }

    /// Resolves a service by type.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|(_, handle)| downcast::<T>(handle))
    }

    /// Returns true if `T` is registered.
    pub fn contains<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.services.values().map(|(name, _)| name))
            .finish()
    }
}
