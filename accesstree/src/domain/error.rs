use accesstree_sdk::AccessError;
use sea_orm::DbErr;

/// Engine-internal error taxonomy.
///
/// "Not permitted" is never an error; resolution returns `Ok(false)`.
/// Recoverable data anomalies are logged and patched in place, not
/// raised (see the service code for the individual cases).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    /// Invalid context/role/capability reference. Fatal to the calling
    /// operation.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: i64 },

    /// Stored state the caller can repair, e.g. a path reset and
    /// pending rebuild.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invariant violation (cyclic parent chain, malformed row...).
    /// Never silently fixed.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl DomainError {
    pub const fn not_found(what: &'static str, id: i64) -> Self {
        Self::NotFound { what, id }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }
}

impl From<DomainError> for AccessError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::NotFound { what, id } => Self::not_found(what, id),
            DomainError::Configuration(msg) => Self::Configuration(msg),
            DomainError::Integrity(msg) => Self::Integrity(msg),
            DomainError::Database(db) => Self::internal(db.to_string()),
        }
    }
}
