//! Trainer registry: the local mirror and ledger identity resolution

pub mod identity;
pub mod store;

pub use identity::{identity_name, IdentityResolver, MspIdentityResolver, StaticIdentityResolver};
pub use store::{normalize_subject, RegistryRecord, RegistryStore};
