//! Consumer-facing error type.
//!
//! Absence of a permission is never an error: resolution returns
//! `Ok(false)`. Errors are reserved for invalid references, broken
//! stored state and infrastructure failures.

/// Errors surfaced to consumers of the engine.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// An id passed by the caller does not exist. Fatal to the calling
    /// operation; never silently defaulted.
    #[error("{what} not found: {id}")]
    NotFound { what: String, id: i64 },

    /// Stored state is inconsistent in a way the caller can fix
    /// (e.g. a path pending rebuild).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Stored state violates an invariant (cyclic parent chain,
    /// duplicate unique row...). Never silently repaired.
    #[error("integrity violation: {0}")]
    Integrity(String),

    /// Infrastructure failure (storage, serialization).
    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    pub fn not_found(what: impl Into<String>, id: i64) -> Self {
        Self::NotFound {
            what: what.into(),
            id,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
