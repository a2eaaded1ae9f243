//! Shared error vocabulary.
//!
//! Only a missing primary entity (the template or the instance of a copy
//! call) is fatal. Unique-id collisions are absorbed by upsert, a failing
//! sibling capacity is recorded in the call's report, and a reference token
//! that resolves to nothing passes through unchanged — none of those
//! surface here.

use thiserror::Error;

use crate::id::EntityKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("store backend error: {0}")]
    Store(String),
}

impl EngineError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
