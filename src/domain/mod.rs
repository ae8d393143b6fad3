//! Domain layer types and invariants.

pub mod articles;
pub mod error;
pub mod front_matter;
pub mod slug;
