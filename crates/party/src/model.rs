//! The party entity.

use chrono::{DateTime, NaiveDate, Utc};
use common::EntityId;
use serde::{Deserialize, Serialize};

/// A person, organization or system user known to the registry.
///
/// On the wire the kind-specific details sit under a key named after the
/// kind, so field paths read `person.firstName`, `organization.legalName`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub id: EntityId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Stamped by the registry when the party is imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_at: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub details: PartyDetails,
}

impl Party {
    /// Creates a person party.
    pub fn person(
        id: EntityId,
        display_name: impl Into<String>,
        created_at: DateTime<Utc>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            display_name: Some(display_name.into()),
            created_at: Some(created_at),
            imported_at: None,
            details: PartyDetails::Person(PersonDetails {
                first_name: Some(first_name.into()),
                last_name: Some(last_name.into()),
                birth_date: None,
            }),
        }
    }

    /// Creates an organization party.
    pub fn organization(
        id: EntityId,
        display_name: impl Into<String>,
        created_at: DateTime<Utc>,
        legal_name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            display_name: Some(display_name.into()),
            created_at: Some(created_at),
            imported_at: None,
            details: PartyDetails::Organization(OrganizationDetails {
                legal_name: Some(legal_name.into()),
                organization_number: None,
            }),
        }
    }

    /// Creates a system-user party.
    pub fn system_user(
        id: EntityId,
        display_name: impl Into<String>,
        created_at: DateTime<Utc>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id,
            display_name: Some(display_name.into()),
            created_at: Some(created_at),
            imported_at: None,
            details: PartyDetails::SystemUser(SystemUserDetails {
                username: Some(username.into()),
            }),
        }
    }

    pub fn kind(&self) -> PartyKind {
        self.details.kind()
    }
}

/// Kind-specific party details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartyDetails {
    Person(PersonDetails),
    Organization(OrganizationDetails),
    SystemUser(SystemUserDetails),
}

impl PartyDetails {
    pub fn kind(&self) -> PartyKind {
        match self {
            Self::Person(_) => PartyKind::Person,
            Self::Organization(_) => PartyKind::Organization,
            Self::SystemUser(_) => PartyKind::SystemUser,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemUserDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Discriminant of [`PartyDetails`], stored alongside each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartyKind {
    Person,
    Organization,
    SystemUser,
}

impl PartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::SystemUser => "systemUser",
        }
    }
}

impl std::fmt::Display for PartyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
