//! Party registry entities and their persistence.
//!
//! This crate provides:
//! - The [`Party`] entity with per-kind details and field-path validation
//! - [`PartyRepository`], the service persistence participants publish
//! - In-memory and PostgreSQL participant factories for the unit of work
//! - [`PartyImportService`], a scoped service built per unit of work

pub mod clock;
pub mod error;
pub mod import_service;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod repository;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{PartyError, PartyStoreError, Result};
pub use import_service::{PartyImportService, PartyImportServiceFactory};
pub use memory::{InMemoryPartyDatabase, InMemoryPartyParticipant, InMemoryPartyParticipantFactory};
pub use model::{OrganizationDetails, Party, PartyDetails, PartyKind, PersonDetails, SystemUserDetails};
pub use postgres::{PostgresPartyParticipant, PostgresPartyParticipantFactory};
pub use repository::PartyRepository;
pub use validation::{ValidatedParty, ValidationError};
