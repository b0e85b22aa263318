//! Integer identities assigned by the persistence layer.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of an entity (aggregate root or owned detail entity).
///
/// The value is `0` ("unset") until the entity is persisted for the first
/// time; the store assigns a positive identity at that point.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// Identity of an entity that has never been persisted.
    pub const UNSET: Self = Self(0);

    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    /// `true` until the store has assigned an identity.
    pub fn is_unset(self) -> bool {
        self.0 == 0
    }
}

impl core::fmt::Display for EntityId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<EntityId> for i64 {
    fn from(value: EntityId) -> Self {
        value.0
    }
}

impl FromStr for EntityId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|e| DomainError::invalid_id(format!("EntityId: {e}")))?;
        if value < 0 {
            return Err(DomainError::invalid_id("EntityId: must not be negative"));
        }
        Ok(Self(value))
    }
}
