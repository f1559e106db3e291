//! Required-field validation for parties.

use common::EntityId;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

use crate::model::{Party, PartyDetails};

/// A party is missing one or more required fields.
///
/// Lists every missing field path, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    pub missing: Vec<String>,
}

impl ValidationError {
    pub fn contains(&self, path: &str) -> bool {
        self.missing.iter().any(|missing| missing == path)
    }
}

#[derive(Default)]
struct MissingFields(Vec<String>);

impl MissingFields {
    fn require<T>(&mut self, path: &str, value: Option<&T>) {
        if value.is_none() {
            self.0.push(path.to_string());
        }
    }

    fn require_text(&mut self, path: &str, value: Option<&String>) {
        if value.is_none_or(|text| text.trim().is_empty()) {
            self.0.push(path.to_string());
        }
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing: self.0 })
        }
    }
}

impl Party {
    /// Checks required fields, reporting every missing path at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut missing = MissingFields::default();

        if self.id.is_nil() {
            missing.0.push("id".to_string());
        }
        missing.require_text("displayName", self.display_name.as_ref());
        missing.require("createdAt", self.created_at.as_ref());

        match &self.details {
            PartyDetails::Person(person) => {
                missing.require_text("person.firstName", person.first_name.as_ref());
                missing.require_text("person.lastName", person.last_name.as_ref());
            }
            PartyDetails::Organization(organization) => {
                missing.require_text("organization.legalName", organization.legal_name.as_ref());
            }
            PartyDetails::SystemUser(user) => {
                missing.require_text("systemUser.username", user.username.as_ref());
            }
        }

        missing.finish()
    }

    /// Validates and wraps the party.
    pub fn into_validated(self) -> Result<ValidatedParty, ValidationError> {
        self.validate()?;
        Ok(ValidatedParty(self))
    }
}

/// A party whose required fields have been checked.
///
/// Only constructible through validation, including when deserialized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Party")]
pub struct ValidatedParty(Party);

impl ValidatedParty {
    pub fn id(&self) -> EntityId {
        self.0.id
    }

    pub fn party(&self) -> &Party {
        &self.0
    }

    pub fn into_inner(self) -> Party {
        self.0
    }
}

impl TryFrom<Party> for ValidatedParty {
    type Error = ValidationError;

    fn try_from(party: Party) -> Result<Self, Self::Error> {
        party.into_validated()
    }
}

impl Serialize for ValidatedParty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::model::{OrganizationDetails, PersonDetails};

    #[test]
    fn complete_person_is_valid() {
        let party = Party::person(EntityId::new(), "Ada", Utc::now(), "Ada", "Lovelace");
        assert!(party.validate().is_ok());
    }

    #[test]
    fn lists_every_missing_field() {
        let party = Party {
            id: EntityId::new(),
            display_name: None,
            created_at: None,
            imported_at: None,
            details: PartyDetails::Person(PersonDetails {
                first_name: Some("Ada".into()),
                last_name: None,
                birth_date: None,
            }),
        };

        let error = party.validate().unwrap_err();
        assert_eq!(
            error.missing,
            vec!["displayName", "createdAt", "person.lastName"]
        );
        assert!(error.to_string().contains("displayName, createdAt"));
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let mut party = Party::organization(EntityId::new(), "  ", Utc::now(), "Acme AS");
        party.details = PartyDetails::Organization(OrganizationDetails {
            legal_name: Some(String::new()),
            organization_number: Some("912345678".into()),
        });

        let error = party.validate().unwrap_err();
        assert!(error.contains("displayName"));
        assert!(error.contains("organization.legalName"));
        assert!(!error.contains("organization.organizationNumber"));
    }

    #[test]
    fn nil_id_is_missing() {
        let party = Party::system_user(EntityId::nil(), "svc", Utc::now(), "svc");
        assert_eq!(party.validate().unwrap_err().missing, vec!["id"]);
    }

    #[test]
    fn deserializing_validated_party_runs_validation() {
        let result: Result<ValidatedParty, _> = serde_json::from_value(json!({
            "id": EntityId::new(),
            "displayName": "Acme",
            "organization": {}
        }));
        let message = result.unwrap_err().to_string();
        assert!(message.contains("createdAt"));
        assert!(message.contains("organization.legalName"));
    }

    #[test]
    fn validated_party_serializes_as_party() {
        let party = Party::person(EntityId::new(), "Ada", Utc::now(), "Ada", "Lovelace");
        let validated = party.clone().into_validated().unwrap();

        assert_eq!(
            serde_json::to_value(&validated).unwrap(),
            serde_json::to_value(&party).unwrap()
        );
        assert_eq!(validated.id(), party.id);
    }
}
