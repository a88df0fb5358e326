//! Capability-composition authorization.
//!
//! A [`Principal`] is an authenticated actor carrying an ordered list of
//! [`Permission`] grants fixed at construction (plus any added later).
//! Authorization is a linear scan over that list: any single grant that
//! provides the required access on the target suffices. There are no deny
//! rules and no caching; everything is derived from the live permission
//! list on every call.

pub mod access;
pub mod permission;
pub mod principal;

pub use access::{Access, SubResource};
pub use permission::{Permission, ResourceRef};
pub use principal::Principal;
