//! Permission grants.
//!
//! Each grant binds a target predicate to an access level and, for most
//! kinds, an owner scope. Grants live inside their principal's permission
//! list; owner derivation scans that list, so a grant with no owner scope
//! (job-status visibility, user self-view) contributes nothing to it.

use serde::{Deserialize, Serialize};

use tessera_core::{ConsumerId, Owner, OwnerId};

use crate::access::{Access, SubResource};

/// The resource a caller is asking about.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceRef {
    Owner(OwnerId),
    Consumer {
        id: ConsumerId,
        owner_id: OwnerId,
    },
    User(String),
    /// A job status record, scoped to the owner it was submitted under
    /// (system-level jobs have no owner).
    JobStatus { owner_id: Option<OwnerId> },
}

/// A single grant held by a principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Permission {
    /// Full control of one consumer and its facets, scoped to its owner.
    ConsumerSelf { owner: Owner, consumer_id: ConsumerId },
    /// Attach entitlements on behalf of one consumer.
    Attach { owner: Owner, consumer_id: ConsumerId },
    /// View and manage one consumer's entitlements.
    ConsumerEntitlements { owner: Owner, consumer_id: ConsumerId },
    /// Read the owner's pools.
    OwnerPools { owner: Owner },
    /// Read the owner's service levels.
    ServiceLevels { owner: Owner },
    /// Report hypervisor check-ins for the owner.
    HypervisorUpdate { owner: Owner },
    /// Explicit per-owner grant attached to a user.
    OwnerAccess {
        owner: Owner,
        access: Access,
        sub_resource: SubResource,
    },
    /// A user may view and manage their own account. Carries no owner.
    UserSelf { username: String },
    /// Visibility of job status records across a set of owners. Carries no
    /// single owner scope.
    JobStatusVisibility { owner_ids: Vec<OwnerId> },
}

impl Permission {
    /// Owner scope of this grant, when it has exactly one.
    pub fn owner(&self) -> Option<&Owner> {
        match self {
            Permission::ConsumerSelf { owner, .. }
            | Permission::Attach { owner, .. }
            | Permission::ConsumerEntitlements { owner, .. }
            | Permission::OwnerPools { owner }
            | Permission::ServiceLevels { owner }
            | Permission::HypervisorUpdate { owner }
            | Permission::OwnerAccess { owner, .. } => Some(owner),
            Permission::UserSelf { .. } | Permission::JobStatusVisibility { .. } => None,
        }
    }

    /// Whether this grant provides at least `required` access to
    /// `sub_resource` of `target`.
    pub fn provides(
        &self,
        target: &ResourceRef,
        sub_resource: SubResource,
        required: Access,
    ) -> bool {
        match self {
            Permission::ConsumerSelf { consumer_id, .. } => {
                matches!(target, ResourceRef::Consumer { id, .. } if id == consumer_id)
                    && Access::All.provides(required)
            }
            Permission::Attach { owner, consumer_id } => {
                let target_ok = match target {
                    ResourceRef::Consumer { id, .. } => id == consumer_id,
                    ResourceRef::Owner(id) => *id == owner.id(),
                    _ => false,
                };
                target_ok
                    && sub_resource == SubResource::Attach
                    && Access::All.provides(required)
            }
            Permission::ConsumerEntitlements { consumer_id, .. } => {
                matches!(target, ResourceRef::Consumer { id, .. } if id == consumer_id)
                    && sub_resource == SubResource::Entitlements
                    && Access::All.provides(required)
            }
            Permission::OwnerPools { owner } => {
                matches!(target, ResourceRef::Owner(id) if *id == owner.id())
                    && sub_resource == SubResource::Pools
                    && Access::ReadOnly.provides(required)
            }
            Permission::ServiceLevels { owner } => {
                matches!(target, ResourceRef::Owner(id) if *id == owner.id())
                    && sub_resource == SubResource::ServiceLevels
                    && Access::ReadOnly.provides(required)
            }
            Permission::HypervisorUpdate { owner } => {
                matches!(target, ResourceRef::Owner(id) if *id == owner.id())
                    && sub_resource == SubResource::Hypervisor
                    && Access::All.provides(required)
            }
            Permission::OwnerAccess {
                owner,
                access,
                sub_resource: granted_sub,
            } => {
                let target_ok = match target {
                    ResourceRef::Owner(id) => *id == owner.id(),
                    ResourceRef::Consumer { owner_id, .. } => *owner_id == owner.id(),
                    _ => false,
                };
                target_ok && granted_sub.covers(sub_resource) && access.provides(required)
            }
            Permission::UserSelf { username } => {
                matches!(target, ResourceRef::User(name) if name == username)
                    && Access::All.provides(required)
            }
            Permission::JobStatusVisibility { owner_ids } => {
                let target_ok = match target {
                    ResourceRef::JobStatus {
                        owner_id: Some(id),
                    } => owner_ids.contains(id),
                    _ => false,
                };
                target_ok
                    && sub_resource == SubResource::Jobs
                    && Access::ReadOnly.provides(required)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Owner {
        Owner::new(OwnerId::new(), "acme")
    }

    #[test]
    fn consumer_self_grant_is_consumer_scoped() {
        let owner = owner();
        let consumer_id = ConsumerId::new();
        let grant = Permission::ConsumerSelf {
            owner: owner.clone(),
            consumer_id,
        };

        let own = ResourceRef::Consumer {
            id: consumer_id,
            owner_id: owner.id(),
        };
        let other = ResourceRef::Consumer {
            id: ConsumerId::new(),
            owner_id: owner.id(),
        };

        assert!(grant.provides(&own, SubResource::None, Access::All));
        assert!(!grant.provides(&other, SubResource::None, Access::ReadOnly));
    }

    #[test]
    fn owner_pools_grant_is_read_only() {
        let owner = owner();
        let grant = Permission::OwnerPools {
            owner: owner.clone(),
        };
        let target = ResourceRef::Owner(owner.id());

        assert!(grant.provides(&target, SubResource::Pools, Access::ReadOnly));
        assert!(!grant.provides(&target, SubResource::Pools, Access::All));
        assert!(!grant.provides(&target, SubResource::Entitlements, Access::ReadOnly));
    }

    #[test]
    fn owner_access_covers_consumers_of_that_owner() {
        let owner = owner();
        let grant = Permission::OwnerAccess {
            owner: owner.clone(),
            access: Access::All,
            sub_resource: SubResource::None,
        };
        let consumer = ResourceRef::Consumer {
            id: ConsumerId::new(),
            owner_id: owner.id(),
        };

        assert!(grant.provides(&consumer, SubResource::Entitlements, Access::All));
        assert!(!grant.provides(
            &ResourceRef::Consumer {
                id: ConsumerId::new(),
                owner_id: OwnerId::new(),
            },
            SubResource::None,
            Access::ReadOnly
        ));
    }

    #[test]
    fn job_status_visibility_has_no_owner_scope() {
        let visible = OwnerId::new();
        let grant = Permission::JobStatusVisibility {
            owner_ids: vec![visible],
        };

        assert!(grant.owner().is_none());
        assert!(grant.provides(
            &ResourceRef::JobStatus {
                owner_id: Some(visible)
            },
            SubResource::Jobs,
            Access::ReadOnly
        ));
        assert!(!grant.provides(
            &ResourceRef::JobStatus {
                owner_id: Some(OwnerId::new())
            },
            SubResource::Jobs,
            Access::ReadOnly
        ));
        assert!(!grant.provides(
            &ResourceRef::JobStatus { owner_id: None },
            SubResource::Jobs,
            Access::ReadOnly
        ));
    }
}
