//! Resource participants and the factories that create them.

use std::any::{Any, TypeId, type_name};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::registry::{ServiceHandle, ServiceRegistry, erase};

/// Upcast helper so a `&dyn Participant` can be downcast to its concrete type.
#[doc(hidden)]
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Owner of exactly one external resource inside a unit of work.
///
/// A participant is created per unit of work and lives exactly as long as it.
/// Methods take `&self`; participants keep their resource behind interior
/// mutability so the services they publish can share it.
///
/// `dispose` is called once, after commit or rollback or without either.
/// When neither was requested the participant applies its own default, for
/// example dropping an open database transaction so the driver rolls it back.
#[async_trait]
pub trait Participant: AsAny + Send + Sync {
    /// Makes the resource's pending changes durable.
    async fn commit(&self) -> Result<(), BoxError>;

    /// Discards the resource's pending changes.
    async fn rollback(&self) -> Result<(), BoxError>;

    /// Releases the resource.
    async fn dispose(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

pub(crate) type Accessor = Arc<dyn Fn(&dyn Participant) -> Option<ServiceHandle> + Send + Sync>;

/// One service type published by a participant.
#[derive(Clone)]
pub(crate) struct ProvidedService {
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) accessor: Accessor,
}

/// Typed registration of the services a participant publishes.
///
/// Each call to [`provide`](Self::provide) records the service type and a
/// plain accessor function, so the manager's type table is built at
/// composition time without inspecting types at runtime.
pub struct ServiceTypes<P> {
    provided: Vec<ProvidedService>,
    _participant: PhantomData<fn(&P)>,
}

impl<P: Participant> ServiceTypes<P> {
    pub(crate) fn new() -> Self {
        Self {
            provided: Vec::new(),
            _participant: PhantomData,
        }
    }

    /// Publishes `T`, resolved by calling `accessor` on the participant.
    pub fn provide<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        accessor: fn(&P) -> Arc<T>,
    ) -> &mut Self {
        let accessor: Accessor = Arc::new(move |participant: &dyn Participant| {
            participant
                .as_any()
                .downcast_ref::<P>()
                .map(|participant| erase(accessor(participant)))
        });
        self.provided.push(ProvidedService {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            accessor,
        });
        self
    }

    pub(crate) fn into_provided(self) -> Vec<ProvidedService> {
        self.provided
    }
}

/// Creates one participant per unit of work.
#[async_trait]
pub trait ParticipantFactory: Send + Sync + 'static {
    /// The participant this factory creates.
    type Participant: Participant;

    /// Declares every service type the participant publishes.
    fn service_types(&self, services: &mut ServiceTypes<Self::Participant>);

    /// Acquires the resource and wraps it in a participant.
    async fn create(
        &self,
        ambient: &ServiceRegistry,
        cancellation: &CancellationToken,
    ) -> Result<Self::Participant, BoxError>;
}

/// Object-safe view of a [`ParticipantFactory`] used by the manager.
#[async_trait]
pub(crate) trait DynParticipantFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn provided_services(&self) -> Vec<ProvidedService>;

    async fn create_boxed(
        &self,
        ambient: &ServiceRegistry,
        cancellation: &CancellationToken,
    ) -> Result<Box<dyn Participant>, BoxError>;
}

#[async_trait]
impl<F: ParticipantFactory> DynParticipantFactory for F {
    fn name(&self) -> &'static str {
        type_name::<F::Participant>()
    }

    fn provided_services(&self) -> Vec<ProvidedService> {
        let mut services = ServiceTypes::new();
        self.service_types(&mut services);
        services.into_provided()
    }

    async fn create_boxed(
        &self,
        ambient: &ServiceRegistry,
        cancellation: &CancellationToken,
    ) -> Result<Box<dyn Participant>, BoxError> {
        let participant = self.create(ambient, cancellation).await?;
        Ok(Box::new(participant))
    }
}
