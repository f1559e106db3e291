//! Lazily created, unit-of-work-scoped services.

use std::any::{TypeId, type_name};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::BoxError;
use crate::registry::{ServiceHandle, downcast, erase};
use crate::UnitOfWork;

/// Builds a service that is not backed by its own resource.
///
/// The service is a pure composition over what the unit of work already
/// resolves (participant services, other factories, ambient services).
/// `create` runs at most once per unit of work, on first access.
/// A factory must not resolve its own service type.
pub trait ServiceFactory: Send + Sync + 'static {
    /// The service type this factory produces.
    type Service: ?Sized + Send + Sync + 'static;

    /// Builds the service for `unit_of_work`.
    fn create(&self, unit_of_work: &UnitOfWork) -> Result<Arc<Self::Service>, BoxError>;
}

/// Object-safe view of a [`ServiceFactory`] used by the manager.
pub(crate) trait DynServiceFactory: Send + Sync {
    fn service_type(&self) -> TypeId;

    fn service_name(&self) -> &'static str;

    fn create_handle(&self, unit_of_work: &UnitOfWork) -> Result<ServiceHandle, BoxError>;
}

impl<F: ServiceFactory> DynServiceFactory for F {
    fn service_type(&self) -> TypeId {
        TypeId::of::<F::Service>()
    }

    fn service_name(&self) -> &'static str {
        type_name::<F::Service>()
    }

    fn create_handle(&self, unit_of_work: &UnitOfWork) -> Result<ServiceHandle, BoxError> {
        self.create(unit_of_work).map(erase)
    }
}

/// Per-instance storage for service-factory results, one slot per factory.
pub(crate) struct ServiceSlots {
    slots: Vec<Mutex<Option<ServiceHandle>>>,
    released: AtomicBool,
}

impl ServiceSlots {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            slots: (0..count).map(|_| Mutex::new(None)).collect(),
            released: AtomicBool::new(false),
        }
    }

    /// Returns the cached service in `slot`, creating it on first access.
    ///
    /// The slot stays locked while `create` runs so concurrent first accesses
    /// can't both invoke the factory. Once [`release`](Self::release) has
    /// started, nothing is created and `Ok(None)` is returned.
    pub(crate) fn get_or_create<T: ?Sized + Send + Sync + 'static>(
        &self,
        slot: usize,
        create: impl FnOnce() -> Result<ServiceHandle, BoxError>,
    ) -> Result<Option<Arc<T>>, BoxError> {
        let Some(slot) = self.slots.get(slot) else {
            return Ok(None);
        };
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_released() {
            return Ok(None);
        }
        if guard.is_none() {
            *guard = Some(create()?);
        }
        Ok(guard.as_ref().and_then(downcast::<T>))
    }

    /// Returns the number of slots that hold a created service.
    pub(crate) fn populated(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner).is_some())
            .count()
    }

    /// Returns true once the slots have been released.
    pub(crate) fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Drops every created service and refuses to create new ones.
    pub(crate) fn release(&self) {
        self.released.store(true, Ordering::Release);
        for slot in &self.slots {
            slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        }
    }
}
