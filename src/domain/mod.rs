//! Domain layer types and invariants.

pub mod error;
pub mod nodes;
pub mod tree;
