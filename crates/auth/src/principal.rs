//! Principals: authenticated actors and their grant lists.

use serde::{Deserialize, Serialize};
use tracing::trace;

use tessera_core::{ConsumerId, Owner, OwnerId};

use crate::access::{Access, SubResource};
use crate::permission::{Permission, ResourceRef};

/// An authenticated actor.
///
/// The permission list is ordered and fixed at construction, apart from
/// explicit [`Principal::add_permission`] calls. Owner visibility is
/// recomputed from the live list on every query, so an added grant takes
/// effect immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Principal {
    /// A registered system acting on its own behalf. Never full access.
    Consumer {
        consumer_id: ConsumerId,
        owner: Owner,
        permissions: Vec<Permission>,
    },
    /// A human (or service) account.
    User {
        username: String,
        full_access: bool,
        permissions: Vec<Permission>,
    },
}

impl Principal {
    /// Principal for a consumer certificate. Auto-grants the consumer's
    /// standard capability set, all scoped to its owning organization.
    pub fn consumer(consumer_id: ConsumerId, owner: Owner) -> Self {
        let permissions = vec![
            Permission::ConsumerSelf {
                owner: owner.clone(),
                consumer_id,
            },
            Permission::Attach {
                owner: owner.clone(),
                consumer_id,
            },
            Permission::ConsumerEntitlements {
                owner: owner.clone(),
                consumer_id,
            },
            Permission::OwnerPools {
                owner: owner.clone(),
            },
            Permission::ServiceLevels {
                owner: owner.clone(),
            },
            Permission::HypervisorUpdate {
                owner: owner.clone(),
            },
            Permission::JobStatusVisibility {
                owner_ids: vec![owner.id()],
            },
        ];
        Principal::Consumer {
            consumer_id,
            owner,
            permissions,
        }
    }

    /// Principal for a logged-in user. The explicit grants come from role
    /// resolution; self-view and job-status visibility across every owner
    /// reachable through them are granted automatically.
    pub fn user(
        username: impl Into<String>,
        explicit: Vec<Permission>,
        full_access: bool,
    ) -> Self {
        let username = username.into();
        let mut permissions = vec![Permission::UserSelf {
            username: username.clone(),
        }];

        let reachable: Vec<OwnerId> = owner_ids_of(&explicit);
        if !reachable.is_empty() {
            permissions.push(Permission::JobStatusVisibility {
                owner_ids: reachable,
            });
        }
        permissions.extend(explicit);

        Principal::User {
            username,
            full_access,
            permissions,
        }
    }

    /// Display name used in logs and event attribution.
    pub fn name(&self) -> String {
        match self {
            Principal::Consumer { consumer_id, .. } => consumer_id.to_string(),
            Principal::User { username, .. } => username.clone(),
        }
    }

    pub fn has_full_access(&self) -> bool {
        matches!(self, Principal::User { full_access: true, .. })
    }

    fn permissions(&self) -> &[Permission] {
        match self {
            Principal::Consumer { permissions, .. } | Principal::User { permissions, .. } => {
                permissions
            }
        }
    }

    /// Append a grant. Reflected immediately in `can_access` and
    /// `owners()`; there is no cache to invalidate.
    pub fn add_permission(&mut self, permission: Permission) {
        match self {
            Principal::Consumer { permissions, .. } | Principal::User { permissions, .. } => {
                permissions.push(permission);
            }
        }
    }

    /// Whether this principal may perform `required` access on
    /// `sub_resource` of `target`. Full access bypasses the scan; otherwise
    /// any single grant that provides the access suffices.
    pub fn can_access(
        &self,
        target: &ResourceRef,
        sub_resource: SubResource,
        required: Access,
    ) -> bool {
        if self.has_full_access() {
            return true;
        }
        let granted = self
            .permissions()
            .iter()
            .any(|p| p.provides(target, sub_resource, required));
        trace!(
            principal = %self.name(),
            granted,
            required = ?required,
            "access check"
        );
        granted
    }

    /// Owners visible to this principal, derived by scanning the live
    /// permission list for owner-scoped grants. Duplicates are collapsed,
    /// first occurrence wins for ordering.
    pub fn owners(&self) -> Vec<Owner> {
        let mut owners: Vec<Owner> = Vec::new();
        for permission in self.permissions() {
            if let Some(owner) = permission.owner() {
                if !owners.iter().any(|o| o.id() == owner.id()) {
                    owners.push(owner.clone());
                }
            }
        }
        owners
    }

    pub fn owner_ids(&self) -> Vec<OwnerId> {
        self.owners().iter().map(Owner::id).collect()
    }
}

fn owner_ids_of(permissions: &[Permission]) -> Vec<OwnerId> {
    let mut ids: Vec<OwnerId> = Vec::new();
    for permission in permissions {
        if let Some(owner) = permission.owner() {
            if !ids.contains(&owner.id()) {
                ids.push(owner.id());
            }
        }
    }
    ids
}
