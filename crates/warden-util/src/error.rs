//! Error types for wardend

use thiserror::Error;

use crate::EntityId;

/// Errors surfaced by restriction operations.
///
/// All variants are recoverable at the command layer: they are reported to
/// the caller and nothing is mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RestrictionError {
    /// `impose` on an entity that already has an active record
    #[error("entity {0} is already restricted")]
    AlreadyRestricted(EntityId),

    /// `release` or `extend` on an entity with no active record
    #[error("entity {0} is not restricted")]
    NotRestricted(EntityId),

    /// Non-positive or unparsable duration input, rejected before any mutation
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

pub type RestrictionResult<T> = Result<T, RestrictionError>;
