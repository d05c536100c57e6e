//! Credential secrets and the pair persisted by the credential store.

pub mod pair;
pub mod secret;
