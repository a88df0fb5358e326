//! Access levels and sub-resource selectors.

use serde::{Deserialize, Serialize};

/// Access level a permission grants or a caller requires.
///
/// Levels are totally ordered: `All` provides `ReadOnly`, which provides
/// `None`. `None` exists so a grant can explicitly carry "no access" and so
/// every query has a lattice bottom.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Access {
    None,
    ReadOnly,
    All,
}

impl Access {
    /// Whether this level satisfies a requirement of `required`.
    pub fn provides(self, required: Access) -> bool {
        self >= required
    }
}

/// Narrows a permission to one facet of its target resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubResource {
    /// The resource itself, no narrowing.
    None,
    Consumers,
    Entitlements,
    Attach,
    Pools,
    ServiceLevels,
    Hypervisor,
    Jobs,
}

impl SubResource {
    /// A grant on `self` covers a request for `requested` when they are the
    /// same facet, or when the grant is un-narrowed.
    pub fn covers(self, requested: SubResource) -> bool {
        self == requested || self == SubResource::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_levels_are_ordered() {
        assert!(Access::All.provides(Access::ReadOnly));
        assert!(Access::All.provides(Access::All));
        assert!(Access::ReadOnly.provides(Access::None));
        assert!(!Access::ReadOnly.provides(Access::All));
        assert!(!Access::None.provides(Access::ReadOnly));
    }

    #[test]
    fn unnarrowed_grant_covers_every_facet() {
        assert!(SubResource::None.covers(SubResource::Pools));
        assert!(SubResource::Pools.covers(SubResource::Pools));
        assert!(!SubResource::Pools.covers(SubResource::Entitlements));
    }
}
