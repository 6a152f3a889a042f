//! Generic entity record and sync metadata

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::now_millis;

/// A unique identifier for an entity, using UUID v7 (time-sortable).
///
/// Generated on the client so records can be created offline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Create a new unique entity ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Sync lifecycle state of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Created locally, never pushed
    #[default]
    Local,
    /// Edited locally since the last successful push
    Pending,
    /// Matches the remote copy
    Synced,
    /// Last push was rejected
    Error,
}

impl SyncStatus {
    /// Stable storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }

    /// Whether the entity holds local changes the remote has not acknowledged
    #[must_use]
    pub const fn is_dirty(self) -> bool {
        !matches!(self, Self::Synced)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// Sync bookkeeping carried by every entity. Never part of the content hash.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncMeta {
    /// Lifecycle state
    pub status: SyncStatus,
    /// Content hash of the last state acknowledged by the remote
    pub hash: Option<String>,
    /// Last successful sync (Unix ms)
    pub last_synced_at: Option<i64>,
    /// Consecutive rejected pushes
    pub attempts: u32,
    /// Earliest time a background cycle may retry (Unix ms)
    pub next_retry_at: Option<i64>,
    /// Message of the last rejection
    pub last_error: Option<String>,
    /// Local write counter, bumped on every facade write
    pub revision: i64,
}

impl SyncMeta {
    /// Metadata for a record that was just acknowledged by the remote.
    #[must_use]
    pub fn synced(hash: String, at: i64) -> Self {
        Self {
            status: SyncStatus::Synced,
            hash: Some(hash),
            last_synced_at: Some(at),
            ..Self::default()
        }
    }

    /// Whether this record has ever been acknowledged by the remote.
    #[must_use]
    pub const fn was_synced(&self) -> bool {
        self.hash.is_some() || !matches!(self.status, SyncStatus::Local)
    }
}

/// Business payload of a synchronizable entity kind.
///
/// `TABLE` names both the local partition and the remote table.
pub trait EntityKind:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Table name shared by the local store and the remote backend
    const TABLE: &'static str;

    /// Display name, indexed for filtering
    fn name(&self) -> &str;

    /// Validate business fields before a local write
    fn validate(&self) -> Result<()> {
        if self.name().trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "{} name cannot be empty",
                Self::TABLE
            )));
        }
        Ok(())
    }
}

/// A domain record with identity, business fields, and sync metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity<T> {
    /// Stable identifier, join key between local and remote copies
    pub id: EntityId,
    /// Owner; `None` for shared system defaults
    pub user_id: Option<String>,
    /// User-controlled active flag
    pub is_active: bool,
    /// User-controlled favorite flag
    pub is_favorite: bool,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms), the last-writer-wins signal
    pub updated_at: i64,
    /// Type-specific business fields
    pub data: T,
    /// Sync bookkeeping
    pub sync: SyncMeta,
}

#[derive(Serialize)]
struct HashedContent<'a, T> {
    user_id: Option<&'a str>,
    is_active: bool,
    is_favorite: bool,
    data: &'a T,
}

impl<T: EntityKind> Entity<T> {
    /// Create a new, never-synced entity with a fresh id
    #[must_use]
    pub fn new(data: T) -> Self {
        let now = now_millis();
        Self {
            id: EntityId::new(),
            user_id: None,
            is_active: true,
            is_favorite: false,
            created_at: now,
            updated_at: now,
            data,
            sync: SyncMeta::default(),
        }
    }

    /// Scope this entity to an owner
    #[must_use]
    pub fn owned_by(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Storage/remote table of this entity kind
    #[must_use]
    pub const fn table(&self) -> &'static str {
        T::TABLE
    }

    /// SHA-256 fingerprint of the synchronizable content.
    ///
    /// Covers owner, flags and business fields; timestamps and sync metadata
    /// are excluded so equal content on both sides hashes equally.
    pub fn content_hash(&self) -> Result<String> {
        let content = HashedContent {
            user_id: self.user_id.as_deref(),
            is_active: self.is_active,
            is_favorite: self.is_favorite,
            data: &self.data,
        };
        let bytes = serde_json::to_vec(&content)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Whether the current content differs from the last acknowledged state
    pub fn needs_push(&self) -> Result<bool> {
        let hash = self.content_hash()?;
        Ok(self.sync.hash.as_deref() != Some(hash.as_str()))
    }

    /// Set `updated_at` to now without ever moving it backwards
    pub fn touch(&mut self) {
        self.updated_at = now_millis().max(self.updated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Family;

    fn family(name: &str) -> Entity<Family> {
        Entity::new(Family {
            name: name.to_string(),
            description: None,
        })
    }

    #[test]
    fn test_entity_id_unique() {
        let id1 = EntityId::new();
        let id2 = EntityId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_entity_id_parse() {
        let id = EntityId::new();
        let parsed: EntityId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_sync_status_roundtrip_str() {
        for status in [
            SyncStatus::Local,
            SyncStatus::Pending,
            SyncStatus::Synced,
            SyncStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!("deleted".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn test_new_entity_is_local() {
        let entity = family("Orchidaceae");
        assert_eq!(entity.sync.status, SyncStatus::Local);
        assert!(entity.is_active);
        assert!(!entity.is_favorite);
        assert_eq!(entity.created_at, entity.updated_at);
        assert!(entity.needs_push().unwrap());
    }

    #[test]
    fn test_hash_ignores_timestamps_and_meta() {
        let mut entity = family("Orchidaceae");
        let before = entity.content_hash().unwrap();

        entity.updated_at += 10_000;
        entity.sync.status = SyncStatus::Error;
        entity.sync.revision = 7;
        assert_eq!(entity.content_hash().unwrap(), before);

        entity.is_favorite = true;
        assert_ne!(entity.content_hash().unwrap(), before);
    }

    #[test]
    fn test_needs_push_false_after_hash_recorded() {
        let mut entity = family("Orchidaceae");
        entity.sync.hash = Some(entity.content_hash().unwrap());
        assert!(!entity.needs_push().unwrap());
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let mut entity = family("Orchidaceae");
        entity.updated_at = i64::MAX - 1;
        entity.touch();
        assert_eq!(entity.updated_at, i64::MAX - 1);
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let entity = family("   ");
        assert!(entity.data.validate().is_err());
    }
}
