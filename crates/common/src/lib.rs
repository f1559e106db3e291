//! Shared types for the party registry workspace.

pub mod types;

pub use types::EntityId;
