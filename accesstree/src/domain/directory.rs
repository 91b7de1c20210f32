//! Seam to the domain entities the scope tree shadows.
//!
//! The engine is generic tree + resolution machinery; it does not know
//! what a "course" is. The embedding application supplies a directory
//! that answers where an instance sits in the tree and whether it still
//! exists.

use async_trait::async_trait;

use accesstree_sdk::models::{ContextLevel, ContextNode};

use super::error::DomainError;

/// Answers parent/existence questions about the external entities that
/// scopes represent, and tears their content down ahead of a scope
/// deletion.
#[async_trait]
pub trait ContextDirectory: Send + Sync {
    /// Where the parent scope of `(level, instance_id)` lives.
    /// `None` means "directly under the system context". Must return
    /// `None` for [`ContextLevel::System`] itself.
    ///
    /// # Errors
    ///
    /// Implementations may fail with [`DomainError::Configuration`]
    /// when the instance's placement cannot be determined.
    async fn parent_of(
        &self,
        level: ContextLevel,
        instance_id: i64,
    ) -> Result<Option<(ContextLevel, i64)>, DomainError>;

    /// Whether the underlying instance still exists. Used by orphan
    /// cleanup.
    ///
    /// # Errors
    ///
    /// Implementation-defined lookup failures.
    async fn exists(&self, level: ContextLevel, instance_id: i64) -> Result<bool, DomainError>;

    /// Remove dependent entities living inside the scope before its
    /// context rows are cascaded away (e.g. blocks attached to a
    /// course). The engine itself owns the context-row cascade; this
    /// hook owns only the domain side.
    ///
    /// # Errors
    ///
    /// Implementation-defined teardown failures abort the deletion.
    async fn delete_content(&self, node: &ContextNode) -> Result<(), DomainError> {
        let _ = node;
        Ok(())
    }
}
