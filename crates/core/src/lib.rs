//! Shared kernel: identifiers, owner scope, error model.

pub mod error;
pub mod id;
pub mod owner;

pub use error::{DomainError, DomainResult};
pub use id::{ConsumerId, OwnerId, UserId};
pub use owner::Owner;
