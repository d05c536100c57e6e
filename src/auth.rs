//! Token claims, advisory decoding, and credential models.

pub mod claims;
pub mod codec;
pub mod token;

pub use claims::*;
pub use codec::*;
pub use token::{pair::*, secret::*};
