//! Owner/organization scope.

use serde::{Deserialize, Serialize};

use crate::id::OwnerId;

/// An owner (organization) — the tenant boundary both resources and job
/// status records are partitioned by.
///
/// This is a scope value, not the persisted entity; the persistence layer
/// owns the full organization record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    id: OwnerId,
    key: String,
}

impl Owner {
    pub fn new(id: OwnerId, key: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
        }
    }

    pub fn id(&self) -> OwnerId {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl core::fmt::Display for Owner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.key)
    }
}
