use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a registry party: a person, an organization or a system user.
///
/// Upstream systems assign it, and the import upserts by it. It serializes as
/// a bare UUID string, which is also the `parties.id` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Allocates a fresh random id, for parties minted locally.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The all-zero id. Upstream sends it when the party has no identity yet,
    /// so validation rejects it.
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for EntityId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EntityId> for Uuid {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locally_minted_parties_get_distinct_ids() {
        assert_ne!(EntityId::new(), EntityId::new());
        assert!(!EntityId::default().is_nil());
    }

    #[test]
    fn upstream_nil_id_is_recognized() {
        let id: EntityId =
            serde_json::from_str("\"00000000-0000-0000-0000-000000000000\"").unwrap();
        assert!(id.is_nil());
        assert_eq!(id, EntityId::nil());
    }

    #[test]
    fn id_matches_the_row_key() {
        let key = Uuid::new_v4();
        let id = EntityId::from(key);
        assert_eq!(Uuid::from(id), key);
        assert_eq!(id.to_string(), key.hyphenated().to_string());
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{key}\""));
    }
}
